//! Table contracts consumed by the planner.

use std::fmt;
use std::sync::Arc;

use quarry_common::{Result, Row, Schema, SessionContext};

use crate::index::{Index, IndexLookup};

/// A fallible row iterator produced by indexed access.
pub type RowIter = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// A relation the planner can resolve and scan.
pub trait Table: fmt::Debug + Send + Sync {
    /// The table's name.
    fn name(&self) -> &str;

    /// The table's schema.
    fn schema(&self) -> &Schema;

    /// The index-addressable view of this table, when it has one.
    fn as_index_addressable(&self) -> Option<&dyn IndexAddressableTable> {
        None
    }

    /// For decorating wrappers, the wrapped table. The planner unwraps
    /// before dispatching on capabilities.
    fn underlying(&self) -> Option<Arc<dyn Table>> {
        None
    }
}

/// Unwraps decorator tables down to the innermost one.
pub fn unwrap_table(table: Arc<dyn Table>) -> Arc<dyn Table> {
    let mut t = table;
    while let Some(inner) = t.underlying() {
        t = inner;
    }
    t
}

/// A table whose rows can be reached through index lookups.
pub trait IndexAddressableTable: Table {
    /// The indexes defined over this table.
    fn indexes(&self) -> Vec<Arc<dyn Index>>;

    /// Returns a view of the table restricted to the given lookup.
    fn indexed_access(&self, lookup: &IndexLookup) -> Result<Arc<dyn IndexedTable>>;
}

/// An index-restricted view of a table.
pub trait IndexedTable: Table {
    /// Iterates the rows matching the lookup.
    fn lookup_partitions(&self, ctx: &SessionContext, lookup: &IndexLookup) -> Result<RowIter>;
}
