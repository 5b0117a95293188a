//! Table-shaped helpers shared by analyzer rules.

use std::cell::Cell;
use std::sync::Arc;

use quarry_common::{Error, Result};
use quarry_storage::{Database, Table};

use crate::plan::{inspect, transform_up, LogicalPlan, TreeIdentity};

/// The first resolved table in the subtree, with its database, ignoring the
/// dual table.
pub fn get_resolved_table(
    node: &LogicalPlan,
) -> Option<(Arc<dyn Table>, Option<Arc<dyn Database>>)> {
    let mut found = None;
    inspect(node, &mut |n| {
        if found.is_some() {
            return false;
        }
        match n {
            LogicalPlan::ResolvedTable {
                table, database, ..
            } => {
                found = Some((Arc::clone(table), database.clone()));
                false
            }
            LogicalPlan::IndexedTableAccess(ita) => {
                found = Some((Arc::clone(ita.table()), ita.database().cloned()));
                false
            }
            _ => true,
        }
    });
    found
}

/// Rewrites the single resolved table (or indexed access) in the subtree to
/// reference the given table. More than one table in the subtree is a rule
/// contract violation.
pub fn with_table(
    node: LogicalPlan,
    table: Arc<dyn Table>,
) -> Result<(LogicalPlan, TreeIdentity)> {
    let found = Cell::new(false);
    let mark = |found: &Cell<bool>| -> Result<()> {
        if found.get() {
            return Err(Error::InAnalysis(
                "attempted to set more than one table in with_table".to_string(),
            ));
        }
        found.set(true);
        Ok(())
    };
    transform_up(node, &|n| match n {
        LogicalPlan::ResolvedTable {
            database, as_of, ..
        } => {
            mark(&found)?;
            Ok((
                LogicalPlan::ResolvedTable {
                    table: Arc::clone(&table),
                    database,
                    as_of,
                },
                TreeIdentity::New,
            ))
        }
        LogicalPlan::IndexedTableAccess(ita) => {
            mark(&found)?;
            Ok((
                LogicalPlan::IndexedTableAccess(ita.with_table(Arc::clone(&table))?),
                TreeIdentity::New,
            ))
        }
        other => Ok((other, TreeIdentity::Same)),
    })
}
