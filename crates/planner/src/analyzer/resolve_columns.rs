//! Column resolution rule.

use quarry_common::{Error, Result, Schema, SessionContext};
use quarry_storage::Catalog;

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::expr::Expression;
use crate::plan::{transform_up, transform_expr_up, LogicalPlan, TreeIdentity};

/// Binds [`Expression::UnresolvedColumn`] references against the schemas of
/// each node's children.
///
/// The builder resolves most columns through its scopes; what reaches this
/// rule are ORDER BY terms left unresolved on purpose (they may name
/// projection aliases or source columns uncovered by a sort pushdown) and
/// references in programmatically constructed trees. A name that no child
/// schema can supply is [`Error::ColumnNotFound`].
pub struct ResolveColumns;

impl AnalyzerRule for ResolveColumns {
    fn id(&self) -> RuleId {
        RuleId::ResolveColumns
    }

    fn apply(
        &self,
        _ctx: &SessionContext,
        _catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| {
            let needs_work = node
                .expressions()
                .iter()
                .any(|e| contains_unresolved_column(e));
            if !needs_work {
                return Ok((node, TreeIdentity::Same));
            }

            let input_schema = child_schema(&node);
            let exprs = node.expressions();
            let mut rewritten = Vec::with_capacity(exprs.len());
            for e in exprs {
                let (e, _) = transform_expr_up(e.clone(), &|expr| match expr {
                    Expression::UnresolvedColumn { table, name } => {
                        match input_schema.index_of(table.as_deref(), &name) {
                            Some(index) => {
                                let col = input_schema.column(index).expect("index in range");
                                Ok((
                                    Expression::GetField {
                                        table: col.source.clone(),
                                        name: col.name.clone(),
                                        index,
                                        data_type: col.data_type.clone(),
                                        nullable: col.nullable,
                                    },
                                    TreeIdentity::New,
                                ))
                            }
                            None => {
                                let display = match &table {
                                    Some(t) => format!("{t}.{name}"),
                                    None => name.clone(),
                                };
                                Err(Error::ColumnNotFound(display))
                            }
                        }
                    }
                    other => Ok((other, TreeIdentity::Same)),
                })?;
                rewritten.push(e);
            }
            Ok((node.with_expressions(rewritten)?, TreeIdentity::New))
        })
    }
}

fn contains_unresolved_column(e: &Expression) -> bool {
    matches!(e, Expression::UnresolvedColumn { .. })
        || e.children().iter().any(|c| contains_unresolved_column(c))
}

/// The row schema a node's expressions are evaluated against: its children's
/// schemas concatenated in order.
fn child_schema(node: &LogicalPlan) -> Schema {
    let mut schema = Schema::empty();
    for child in node.children() {
        schema = schema.concat(&child.schema());
    }
    schema
}
