//! Catalog contracts: databases, tables, and function resolution.

use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;
use quarry_common::{Result, SessionContext, Value};

use crate::table::Table;

/// A namespace of tables.
pub trait Database: fmt::Debug + Send + Sync {
    /// The database's name.
    fn name(&self) -> &str;

    /// For privilege-checking wrappers, the wrapped database. The planner
    /// unwraps before attaching a database to a resolved table.
    fn underlying(&self) -> Option<Arc<dyn Database>> {
        None
    }
}

/// Unwraps privileged database decorators down to the innermost database.
pub fn unwrap_database(db: Arc<dyn Database>) -> Arc<dyn Database> {
    let mut d = db;
    while let Some(inner) = d.underlying() {
        d = inner;
    }
    d
}

/// Evaluator signature for scalar functions.
pub type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A resolved scalar function.
#[derive(Clone)]
pub struct Function {
    /// Function name, lower-cased.
    pub name: String,
    /// Result type.
    pub return_type: DataType,
    /// Whether the result may be NULL.
    pub nullable: bool,
    /// The evaluator.
    pub eval: ScalarFn,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// A function producing a table from scalar arguments.
pub trait TableFunction: fmt::Debug + Send + Sync {
    /// The function's name, lower-cased.
    fn name(&self) -> &str;

    /// Instantiates the table for the given argument values.
    fn instance(&self, args: &[Value]) -> Result<Arc<dyn Table>>;
}

/// The catalog surface the planner consumes.
///
/// The catalog is the one object shared across sessions; implementations must
/// be safe for concurrent readers with DDL writes serialized by the executor
/// layer.
pub trait Catalog: Send + Sync {
    /// Resolves a database by name.
    fn database(&self, ctx: &SessionContext, name: &str) -> Result<Arc<dyn Database>>;

    /// Resolves a table, returning it with its owning database.
    fn table(
        &self,
        ctx: &SessionContext,
        db: &str,
        name: &str,
    ) -> Result<(Arc<dyn Table>, Arc<dyn Database>)>;

    /// Resolves a table as of an opaque version marker. The catalog
    /// interprets the marker.
    fn table_as_of(
        &self,
        ctx: &SessionContext,
        db: &str,
        name: &str,
        as_of: &Value,
    ) -> Result<(Arc<dyn Table>, Arc<dyn Database>)>;

    /// Resolves a scalar function by name.
    fn function(&self, ctx: &SessionContext, name: &str) -> Result<Function>;

    /// Resolves a table function by name.
    fn table_function(&self, ctx: &SessionContext, name: &str) -> Result<Arc<dyn TableFunction>>;
}
