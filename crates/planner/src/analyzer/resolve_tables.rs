//! Table resolution rule.

use quarry_common::{Error, Result, SessionContext};
use quarry_storage::catalog::unwrap_database;
use quarry_storage::Catalog;

use crate::analyzer::{AnalyzerRule, RuleId};
use crate::expr::Expression;
use crate::plan::{transform_up, LogicalPlan, TreeIdentity};

/// Binds [`LogicalPlan::UnresolvedTable`] nodes against the catalog.
///
/// The builder resolves tables while it walks the AST; this rule covers
/// programmatically constructed trees and re-analysis after rewrites that
/// reintroduce unresolved references.
pub struct ResolveTables;

impl AnalyzerRule for ResolveTables {
    fn id(&self) -> RuleId {
        RuleId::ResolveTables
    }

    fn apply(
        &self,
        ctx: &SessionContext,
        catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)> {
        transform_up(plan, &|node| match node {
            LogicalPlan::UnresolvedTable {
                database,
                name,
                as_of,
            } => {
                let db = if database.is_empty() {
                    ctx.current_database().to_string()
                } else {
                    database
                };

                let mut as_of_value = None;
                if let Some(marker) = &as_of {
                    if !marker.resolved() {
                        // bind variables stay deferred; the builder already
                        // produced a deferred node for its own paths
                        if let Expression::BindVar { .. } = marker {
                            let (table, database) =
                                lookup(ctx, catalog, &db, &name, None)?;
                            return Ok((
                                LogicalPlan::DeferredAsOfTable {
                                    table,
                                    database: Some(database),
                                    as_of: marker.clone(),
                                },
                                TreeIdentity::New,
                            ));
                        }
                        return Err(Error::InAnalysis(format!(
                            "unresolved AS OF marker for table {name}"
                        )));
                    }
                    as_of_value = Some(marker.eval(ctx, &Vec::new())?);
                }

                let (table, database) = lookup(ctx, catalog, &db, &name, as_of_value.as_ref())?;
                Ok((
                    LogicalPlan::ResolvedTable {
                        table,
                        database: Some(database),
                        as_of: as_of_value,
                    },
                    TreeIdentity::New,
                ))
            }
            other => Ok((other, TreeIdentity::Same)),
        })
    }
}

fn lookup(
    ctx: &SessionContext,
    catalog: &dyn Catalog,
    db: &str,
    name: &str,
    as_of: Option<&quarry_common::Value>,
) -> Result<(
    std::sync::Arc<dyn quarry_storage::Table>,
    std::sync::Arc<dyn quarry_storage::Database>,
)> {
    let result = match as_of {
        Some(marker) => catalog.table_as_of(ctx, db, name, marker),
        None => catalog.table(ctx, db, name),
    };
    let (table, database) = result.map_err(|e| match e {
        Error::DatabaseNotFound(_) if db.is_empty() => Error::NoDatabaseSelected,
        other => other,
    })?;
    Ok((table, unwrap_database(database)))
}
