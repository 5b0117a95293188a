//! ORDER BY position-literal resolution.

use quarry_common::{Error, Result, SessionContext, Value};
use quarry_storage::Catalog;

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::expr::{Expression, SortField};
use crate::plan::{transform_up, LogicalPlan, TreeIdentity};

/// Rewrites integer literals in ORDER BY to references to the k-th projected
/// column: `ORDER BY 2` sorts on the second output column.
///
/// The replacement is an unresolved qualified column, bound by the column
/// resolution rule that runs later; applying this rule twice is therefore a
/// no-op. Positions outside `1..=width` are [`Error::OrderByColumnIndex`].
pub struct ResolveOrderbyLiterals;

impl AnalyzerRule for ResolveOrderbyLiterals {
    fn id(&self) -> RuleId {
        RuleId::ResolveOrderbyLiterals
    }

    fn apply(
        &self,
        _ctx: &SessionContext,
        _catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| match &node {
            LogicalPlan::Sort { fields, input } => {
                let schema = input.schema();
                match rewrite_fields(fields, &schema)? {
                    None => Ok((node, TreeIdentity::Same)),
                    Some(fields) => Ok((
                        LogicalPlan::Sort {
                            fields,
                            input: input.clone(),
                        },
                        TreeIdentity::New,
                    )),
                }
            }
            LogicalPlan::Union { sort_fields, left, .. } if !sort_fields.is_empty() => {
                let schema = left.schema();
                match rewrite_fields(sort_fields, &schema)? {
                    None => Ok((node, TreeIdentity::Same)),
                    Some(fields) => {
                        let mut exprs: Vec<Expression> = fields.into_iter().map(|f| f.expr).collect();
                        // the union's remaining expressions (limit/offset)
                        // follow the sort fields in expression order
                        let existing = node.expressions();
                        for e in existing.iter().skip(exprs.len()) {
                            exprs.push((*e).clone());
                        }
                        Ok((node.with_expressions(exprs)?, TreeIdentity::New))
                    }
                }
            }
            _ => Ok((node, TreeIdentity::Same)),
        })
    }
}

/// Returns the rewritten fields, or `None` when no field was a position
/// literal.
fn rewrite_fields(
    fields: &[SortField],
    schema: &quarry_common::Schema,
) -> Result<Option<Vec<SortField>>> {
    let mut changed = false;
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        match &field.expr {
            Expression::Literal {
                value: Value::Int64(k),
                ..
            } => {
                if *k < 1 || *k as usize > schema.len() {
                    return Err(Error::OrderByColumnIndex(*k));
                }
                let col = schema.column(*k as usize - 1).expect("checked above");
                changed = true;
                out.push(SortField {
                    expr: Expression::qualified_column(col.source.clone(), col.name.clone()),
                    ..field.clone()
                });
            }
            _ => out.push(field.clone()),
        }
    }
    Ok(if changed { Some(out) } else { None })
}
