//! Index selection: turning table scans into indexed access.
//!
//! Two shapes are rewritten:
//! - `Filter` over a resolved table whose conjuncts pin an index prefix to
//!   constants becomes a static [`IndexedTableAccess`]; the filter stays in
//!   place above it.
//! - an inner join whose equality conjuncts map left-row fields onto an
//!   index prefix of the right table gets its right side replaced by a
//!   dynamic [`IndexedTableAccess`] keyed on the left row.

use std::sync::Arc;

use quarry_common::{Result, SessionContext};
use quarry_storage::table::unwrap_table;
use quarry_storage::{Catalog, Index};

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::expr::{BinaryOp, Expression};
use crate::plan::{
    transform_up, IndexedTableAccess, JoinType, LogicalPlan, LookupBuilder, TreeIdentity,
};

/// Materializes indexed table access under filters and joins.
pub struct ApplyIndexes;

impl AnalyzerRule for ApplyIndexes {
    fn id(&self) -> RuleId {
        RuleId::ApplyIndexes
    }

    fn apply(
        &self,
        ctx: &SessionContext,
        _catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| match &node {
            LogicalPlan::Filter { predicate, input } => {
                match try_static_access(ctx, predicate, input)? {
                    Some(rewritten) => Ok((
                        LogicalPlan::Filter {
                            predicate: predicate.clone(),
                            input: Box::new(rewritten),
                        },
                        TreeIdentity::New,
                    )),
                    None => Ok((node, TreeIdentity::Same)),
                }
            }
            LogicalPlan::Join {
                op: JoinType::Inner,
                condition: Some(condition),
                left,
                right,
            } => match try_lookup_join(ctx, condition, left, right)? {
                Some(new_right) => Ok((
                    LogicalPlan::Join {
                        op: JoinType::Inner,
                        condition: Some(condition.clone()),
                        left: left.clone(),
                        right: Box::new(new_right),
                    },
                    TreeIdentity::New,
                )),
                None => Ok((node, TreeIdentity::Same)),
            },
            _ => Ok((node, TreeIdentity::Same)),
        })
    }
}

/// One equality conjunct usable for index construction.
struct KeyEquality {
    /// The indexed column's name on the table side.
    column: String,
    /// The expression producing the key value.
    key: Expression,
    /// Whether the conjunct is `<=>`.
    null_safe: bool,
}

/// Splits a predicate into conjuncts.
fn conjuncts(e: &Expression) -> Vec<&Expression> {
    match e {
        Expression::And { left, right } => {
            let mut out = conjuncts(left);
            out.extend(conjuncts(right));
            out
        }
        other => vec![other],
    }
}

fn filter_equalities(predicate: &Expression) -> Vec<KeyEquality> {
    let mut out = Vec::new();
    for c in conjuncts(predicate) {
        let Expression::Binary { op, left, right } = c else {
            continue;
        };
        let null_safe = match op {
            BinaryOp::Eq => false,
            BinaryOp::NullSafeEq => true,
            _ => continue,
        };
        let (field, value) = match (left.as_ref(), right.as_ref()) {
            (Expression::GetField { name, .. }, Expression::Literal { .. }) => {
                (name.clone(), right.as_ref().clone())
            }
            (Expression::Literal { .. }, Expression::GetField { name, .. }) => {
                (name.clone(), left.as_ref().clone())
            }
            _ => continue,
        };
        out.push(KeyEquality {
            column: field,
            key: value,
            null_safe,
        });
    }
    out
}

/// Equality conjuncts of a join condition split into (right column, left key).
fn join_equalities(condition: &Expression, left_width: usize) -> Vec<KeyEquality> {
    let mut out = Vec::new();
    for c in conjuncts(condition) {
        let Expression::Binary { op, left, right } = c else {
            continue;
        };
        let null_safe = match op {
            BinaryOp::Eq => false,
            BinaryOp::NullSafeEq => true,
            _ => continue,
        };
        let (l, r) = (left.as_ref(), right.as_ref());
        let (Expression::GetField { index: li, .. }, Expression::GetField { index: ri, .. }) =
            (l, r)
        else {
            continue;
        };
        // one side from the left row, one from the right table
        let (left_side, right_side) = if *li < left_width && *ri >= left_width {
            (l, r)
        } else if *ri < left_width && *li >= left_width {
            (r, l)
        } else {
            continue;
        };
        let Expression::GetField { name, .. } = right_side else {
            continue;
        };
        out.push(KeyEquality {
            column: name.clone(),
            key: left_side.clone(),
            null_safe,
        });
    }
    out
}

/// The longest index prefix covered by the equalities, as (key expressions,
/// null mask).
fn match_index_prefix(
    index: &Arc<dyn Index>,
    equalities: &[KeyEquality],
) -> Option<(Vec<Expression>, Vec<bool>)> {
    let mut keys = Vec::new();
    let mut mask = Vec::new();
    for cet in index.column_expression_types() {
        let column = cet
            .expression
            .rsplit('.')
            .next()
            .unwrap_or(&cet.expression)
            .to_lowercase();
        match equalities.iter().find(|e| e.column == column) {
            Some(eq) => {
                keys.push(eq.key.clone());
                mask.push(eq.null_safe);
            }
            None => break,
        }
    }
    if keys.is_empty() {
        None
    } else {
        Some((keys, mask))
    }
}

/// The widest matchable index for the equalities; unique indexes win ties.
fn best_index(
    indexes: &[Arc<dyn Index>],
    equalities: &[KeyEquality],
) -> Option<(Arc<dyn Index>, Vec<Expression>, Vec<bool>)> {
    let mut best: Option<(Arc<dyn Index>, Vec<Expression>, Vec<bool>)> = None;
    for index in indexes {
        if let Some((keys, mask)) = match_index_prefix(index, equalities) {
            let better = match &best {
                None => true,
                Some((current, current_keys, _)) => {
                    keys.len() > current_keys.len()
                        || (keys.len() == current_keys.len()
                            && index.is_unique()
                            && !current.is_unique())
                }
            };
            if better {
                best = Some((Arc::clone(index), keys, mask));
            }
        }
    }
    best
}

/// Rewrites a resolved-table scan under a constant filter into a static
/// indexed access, preserving any alias wrapper.
fn try_static_access(
    ctx: &SessionContext,
    predicate: &Expression,
    input: &LogicalPlan,
) -> Result<Option<LogicalPlan>> {
    let (alias, scan) = match input {
        LogicalPlan::TableAlias { name, input } => (Some(name.clone()), input.as_ref()),
        other => (None, other),
    };
    let LogicalPlan::ResolvedTable {
        table, database, ..
    } = scan
    else {
        return Ok(None);
    };
    let inner = unwrap_table(Arc::clone(table));
    let Some(addressable) = inner.as_index_addressable() else {
        return Ok(None);
    };

    let equalities = filter_equalities(predicate);
    let Some((index, keys, mask)) = best_index(&addressable.indexes(), &equalities) else {
        return Ok(None);
    };

    let mut builder = LookupBuilder::new(index, keys, mask)?;
    let lookup = builder.lookup_for_row(ctx, &Vec::new())?;
    let ita = IndexedTableAccess::new_static(Arc::clone(table), database.clone(), lookup)?;
    let node = LogicalPlan::IndexedTableAccess(ita);
    Ok(Some(match alias {
        Some(name) => LogicalPlan::TableAlias {
            name,
            input: Box::new(node),
        },
        None => node,
    }))
}

/// Rewrites the right side of an equi-join into a dynamic indexed access
/// keyed on left-row fields.
fn try_lookup_join(
    ctx: &SessionContext,
    condition: &Expression,
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> Result<Option<LogicalPlan>> {
    let (alias, scan) = match right {
        LogicalPlan::TableAlias { name, input } => (Some(name.clone()), input.as_ref()),
        other => (None, other),
    };
    let LogicalPlan::ResolvedTable {
        table, database, ..
    } = scan
    else {
        return Ok(None);
    };
    let inner = unwrap_table(Arc::clone(table));
    let Some(addressable) = inner.as_index_addressable() else {
        return Ok(None);
    };

    let left_width = left.schema().len();
    let equalities = join_equalities(condition, left_width);
    let Some((index, keys, mask)) = best_index(&addressable.indexes(), &equalities) else {
        return Ok(None);
    };

    let builder = LookupBuilder::new(index, keys, mask)?;
    let ita = IndexedTableAccess::new_dynamic(Arc::clone(table), database.clone(), builder)?;
    if !ita.can_build_index(ctx) {
        return Ok(None);
    }
    let node = LogicalPlan::IndexedTableAccess(ita);
    Ok(Some(match alias {
        Some(name) => LogicalPlan::TableAlias {
            name,
            input: Box::new(node),
        },
        None => node,
    }))
}
