//! Sort pushdown below projection-shaped nodes.

use quarry_common::{Result, SessionContext};
use quarry_storage::Catalog;

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::expr::{Expression, SortField};
use crate::plan::{transform_up, LogicalPlan, TreeIdentity};

/// Moves a Sort below a Project, GroupBy, or Window whose output hides the
/// sort keys, so the sort runs against source columns.
///
/// When every sort key is hidden the two nodes swap. When keys mix hidden
/// source columns with projection outputs, the projection is extended with
/// the hidden columns, the sort runs above it, and a compensating Project
/// restores the original output shape. Fixed points (all keys already
/// visible in the output) are left untouched, making the rule idempotent.
pub struct PushdownSort;

impl AnalyzerRule for PushdownSort {
    fn id(&self) -> RuleId {
        RuleId::PushdownSort
    }

    fn apply(
        &self,
        _ctx: &SessionContext,
        _catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| {
            let LogicalPlan::Sort { fields, input } = &node else {
                return Ok((node, TreeIdentity::Same));
            };
            if !is_projection_shaped(input) {
                return Ok((node, TreeIdentity::Same));
            }

            let output = input.schema();
            let hidden: Vec<&SortField> = fields
                .iter()
                .filter(|f| !field_in_schema(f, &output))
                .collect();
            if hidden.is_empty() {
                return Ok((node, TreeIdentity::Same));
            }

            if hidden.len() == fields.len() {
                // every key is hidden: swap the sort below the projection
                let inner = input.children()[0].clone();
                let sorted = LogicalPlan::Sort {
                    fields: fields.clone(),
                    input: Box::new(inner),
                };
                let swapped = input.with_children(vec![sorted])?;
                return Ok((swapped, TreeIdentity::New));
            }

            // mixed: extend the projection with the hidden keys, sort above
            // it, and restore the original shape with a compensating Project
            let extended = extend_outputs(input, &hidden)?;
            let sorted = LogicalPlan::Sort {
                fields: fields.clone(),
                input: Box::new(extended),
            };
            let compensation: Vec<Expression> = output
                .iter()
                .enumerate()
                .map(|(index, col)| Expression::GetField {
                    table: col.source.clone(),
                    name: col.name.clone(),
                    index,
                    data_type: col.data_type.clone(),
                    nullable: col.nullable,
                })
                .collect();
            Ok((
                LogicalPlan::Project {
                    exprs: compensation,
                    input: Box::new(sorted),
                },
                TreeIdentity::New,
            ))
        })
    }
}

fn is_projection_shaped(node: &LogicalPlan) -> bool {
    matches!(
        node,
        LogicalPlan::Project { .. } | LogicalPlan::GroupBy { .. } | LogicalPlan::Window { .. }
    )
}

/// Whether a sort key is available in the node's output schema, by name (and
/// source when qualified).
fn field_in_schema(field: &SortField, schema: &quarry_common::Schema) -> bool {
    match &field.expr {
        Expression::UnresolvedColumn { table, name } => {
            schema.index_of(table.as_deref(), name).is_some()
        }
        Expression::GetField { table, name, .. } => {
            schema.index_of(Some(table), name).is_some()
                || schema.index_of(None, name).is_some()
        }
        // computed sort keys are evaluated against the projection output
        _ => true,
    }
}

/// The projection-shaped node with the hidden sort keys appended to its
/// outputs as unresolved references, for later binding.
fn extend_outputs(node: &LogicalPlan, hidden: &[&SortField]) -> Result<LogicalPlan> {
    let extra: Vec<Expression> = hidden.iter().map(|f| f.expr.clone()).collect();
    Ok(match node {
        LogicalPlan::Project { exprs, input } => {
            let mut exprs = exprs.clone();
            exprs.extend(extra);
            LogicalPlan::Project {
                exprs,
                input: input.clone(),
            }
        }
        LogicalPlan::GroupBy {
            selected,
            grouping,
            input,
        } => {
            let mut selected = selected.clone();
            selected.extend(extra);
            LogicalPlan::GroupBy {
                selected,
                grouping: grouping.clone(),
                input: input.clone(),
            }
        }
        LogicalPlan::Window { exprs, input } => {
            let mut exprs = exprs.clone();
            exprs.extend(extra);
            LogicalPlan::Window {
                exprs,
                input: input.clone(),
            }
        }
        other => other.clone(),
    })
}
