//! SQL parse layer for Quarry.
//!
//! The parser itself is an external collaborator: this crate only adapts
//! `sqlparser` output into the crate-local error contract.

use quarry_common::{Error, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parses a SQL string into statements.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| Error::Planning(e.to_string()))
}

/// Parses a SQL string expected to hold exactly one statement.
pub fn parse_one(sql: &str) -> Result<Statement> {
    let mut stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(Error::Planning(format!(
            "expected a single statement, got {}",
            stmts.len()
        )));
    }
    Ok(stmts.remove(0))
}
