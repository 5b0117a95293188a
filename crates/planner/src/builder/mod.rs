//! Scope-aware translation of parsed SQL statements into logical plans.
//!
//! The builder consults the catalog while it walks the AST, so table
//! references resolve during construction; names it cannot bind yet (ORDER BY
//! aliases, bind variables) are left as placeholder expressions for the
//! analyzer. Errors abort the current statement at the first failure.

mod ddl;
mod from;
mod scalar;
mod select;

use quarry_common::{Error, Result, SessionContext};
use quarry_storage::Catalog;
use sqlparser::ast::Statement;
use tracing::debug;

use crate::plan::LogicalPlan;
use crate::scope::Scope;

/// Translates parsed statements into logical plan trees.
pub struct PlanBuilder<'a> {
    pub(crate) ctx: &'a SessionContext,
    pub(crate) catalog: &'a dyn Catalog,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder over a session and catalog.
    pub fn new(ctx: &'a SessionContext, catalog: &'a dyn Catalog) -> Self {
        Self { ctx, catalog }
    }

    /// Builds one statement. SELECT (with unions) and CREATE TABLE are the
    /// supported statement kinds.
    pub fn build_statement(&self, stmt: &Statement) -> Result<LogicalPlan> {
        debug!(statement = %stmt, "building statement");
        match stmt {
            Statement::Query(q) => {
                let scope = Scope::new();
                let mut out = self.build_query(&scope, q)?;
                out.take_node()
            }
            Statement::CreateTable(ct) => self.build_create_table(ct),
            other => Err(Error::UnsupportedSyntax(other.to_string())),
        }
    }

    /// Parses and builds a single SQL statement.
    pub fn build_sql(&self, sql: &str) -> Result<LogicalPlan> {
        let stmt = quarry_sql::parse_one(sql)?;
        self.build_statement(&stmt)
    }
}
