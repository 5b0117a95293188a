//! In-memory catalog, database, table, and index implementations.
//!
//! These back the integration suites: tables hold literal rows, indexes
//! evaluate lookups by filtering those rows, and the catalog can stage
//! versioned snapshots for AS OF resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::DataType;
use quarry_common::{Error, Result, Row, Schema, SessionContext, Value};

use crate::catalog::{Catalog, Database, Function, TableFunction};
use crate::index::{ColumnExpressionType, Index, IndexLookup, RangeCollection};
use crate::table::{IndexAddressableTable, IndexedTable, RowIter, Table};

/// An index over columns of a [`MemoryTable`].
///
/// `can_support` accepts prefix-shaped range collections only: once a key
/// position is unconstrained (`All`), every later position must be
/// unconstrained too.
#[derive(Debug)]
pub struct MemoryIndex {
    id: String,
    table: String,
    unique: bool,
    cets: Vec<ColumnExpressionType>,
    /// Positions of the indexed columns in the table schema.
    positions: Vec<usize>,
}

impl MemoryIndex {
    /// Positions of the indexed columns within the owning table's schema.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

impl Index for MemoryIndex {
    fn id(&self) -> &str {
        &self.id
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn column_expression_types(&self) -> Vec<ColumnExpressionType> {
        self.cets.clone()
    }

    fn can_support(&self, ranges: &RangeCollection) -> bool {
        ranges.0.iter().all(|range| {
            if range.len() != self.cets.len() {
                return false;
            }
            let mut saw_all = false;
            for rce in &range.0 {
                match rce {
                    crate::index::RangeColumnExpr::All { .. } => saw_all = true,
                    _ if saw_all => return false,
                    _ => {}
                }
            }
            true
        })
    }
}

/// An in-memory table with literal rows and optional indexes.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    schema: Schema,
    rows: Vec<Row>,
    indexes: Vec<Arc<MemoryIndex>>,
}

impl MemoryTable {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds rows.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Declares an index over the named columns.
    ///
    /// Panics when a column is missing from the schema; fixtures are built
    /// statically in tests.
    pub fn with_index(mut self, id: &str, columns: &[&str], unique: bool) -> Self {
        let mut cets = Vec::with_capacity(columns.len());
        let mut positions = Vec::with_capacity(columns.len());
        for col in columns {
            let pos = self
                .schema
                .index_of(None, col)
                .unwrap_or_else(|| panic!("index column {col} not in table {}", self.name));
            positions.push(pos);
            let c = self.schema.column(pos).expect("position in range");
            cets.push(ColumnExpressionType {
                expression: format!("{}.{}", self.name, c.name),
                data_type: c.data_type.clone(),
            });
        }
        self.indexes.push(Arc::new(MemoryIndex {
            id: id.to_string(),
            table: self.name.clone(),
            unique,
            cets,
            positions,
        }));
        self
    }

    /// The table's rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn as_index_addressable(&self) -> Option<&dyn IndexAddressableTable> {
        if self.indexes.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl IndexAddressableTable for MemoryTable {
    fn indexes(&self) -> Vec<Arc<dyn Index>> {
        self.indexes
            .iter()
            .map(|i| Arc::clone(i) as Arc<dyn Index>)
            .collect()
    }

    fn indexed_access(&self, lookup: &IndexLookup) -> Result<Arc<dyn IndexedTable>> {
        let index = self
            .indexes
            .iter()
            .find(|i| i.id() == lookup.index.id())
            .ok_or_else(|| Error::InvalidArgument(format!("index {}", lookup.index.id())))?;
        Ok(Arc::new(MemoryIndexedTable {
            name: self.name.clone(),
            schema: self.schema.clone(),
            rows: self.rows.clone(),
            positions: index.positions.clone(),
        }))
    }
}

/// An index-restricted view over a [`MemoryTable`].
#[derive(Debug)]
pub struct MemoryIndexedTable {
    name: String,
    schema: Schema,
    rows: Vec<Row>,
    positions: Vec<usize>,
}

impl Table for MemoryIndexedTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl IndexedTable for MemoryIndexedTable {
    fn lookup_partitions(&self, _ctx: &SessionContext, lookup: &IndexLookup) -> Result<RowIter> {
        if lookup.is_empty_range {
            return Ok(Box::new(std::iter::empty()));
        }
        let positions = self.positions.clone();
        let ranges = lookup.ranges.clone();
        let matching: Vec<Result<Row>> = self
            .rows
            .iter()
            .filter(|row| {
                ranges.0.iter().any(|range| {
                    range
                        .0
                        .iter()
                        .zip(&positions)
                        .all(|(rce, pos)| rce.matches(&row[*pos]))
                })
            })
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::new(matching.into_iter()))
    }
}

/// An in-memory database holding tables and versioned snapshots.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    name: String,
    tables: RwLock<HashMap<String, Arc<MemoryTable>>>,
    /// table name -> version marker string -> snapshot
    versions: RwLock<HashMap<String, HashMap<String, Arc<MemoryTable>>>>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a table.
    pub fn add_table(&self, table: MemoryTable) {
        self.tables
            .write()
            .expect("table lock poisoned")
            .insert(table.name.to_lowercase(), Arc::new(table));
    }

    /// Registers a snapshot of a table under a version marker.
    pub fn add_table_version(&self, version: &str, table: MemoryTable) {
        self.versions
            .write()
            .expect("version lock poisoned")
            .entry(table.name.to_lowercase())
            .or_default()
            .insert(version.to_string(), Arc::new(table));
    }

    fn table(&self, name: &str) -> Option<Arc<MemoryTable>> {
        self.tables
            .read()
            .expect("table lock poisoned")
            .get(&name.to_lowercase())
            .cloned()
    }

    fn table_as_of(&self, name: &str, as_of: &Value) -> Option<Arc<MemoryTable>> {
        let marker = match as_of {
            Value::Utf8(s) => s.clone(),
            other => other.to_string(),
        };
        self.versions
            .read()
            .expect("version lock poisoned")
            .get(&name.to_lowercase())
            .and_then(|m| m.get(&marker).cloned())
            .or_else(|| self.table(name))
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }
}

/// An in-memory catalog of databases, functions, and table functions.
#[derive(Default)]
pub struct MemoryCatalog {
    databases: HashMap<String, Arc<MemoryDatabase>>,
    functions: HashMap<String, Function>,
    table_functions: HashMap<String, Arc<dyn TableFunction>>,
}

impl MemoryCatalog {
    /// Creates a catalog preloaded with the built-in scalar functions.
    pub fn new() -> Self {
        let mut cat = Self::default();
        for f in builtin_functions() {
            cat.functions.insert(f.name.clone(), f);
        }
        cat
    }

    /// Registers a database.
    pub fn add_database(&mut self, db: MemoryDatabase) {
        self.databases.insert(db.name.to_lowercase(), Arc::new(db));
    }

    /// Registers a scalar function.
    pub fn register_function(&mut self, f: Function) {
        self.functions.insert(f.name.clone(), f);
    }

    /// Registers a table function.
    pub fn register_table_function(&mut self, f: Arc<dyn TableFunction>) {
        self.table_functions.insert(f.name().to_lowercase(), f);
    }

    fn db(&self, name: &str) -> Result<Arc<MemoryDatabase>> {
        self.databases
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }
}

impl Catalog for MemoryCatalog {
    fn database(&self, _ctx: &SessionContext, name: &str) -> Result<Arc<dyn Database>> {
        Ok(self.db(name)? as Arc<dyn Database>)
    }

    fn table(
        &self,
        _ctx: &SessionContext,
        db: &str,
        name: &str,
    ) -> Result<(Arc<dyn Table>, Arc<dyn Database>)> {
        let database = self.db(db)?;
        let table = database
            .table(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok((table as Arc<dyn Table>, database as Arc<dyn Database>))
    }

    fn table_as_of(
        &self,
        _ctx: &SessionContext,
        db: &str,
        name: &str,
        as_of: &Value,
    ) -> Result<(Arc<dyn Table>, Arc<dyn Database>)> {
        let database = self.db(db)?;
        let table = database
            .table_as_of(name, as_of)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok((table as Arc<dyn Table>, database as Arc<dyn Database>))
    }

    fn function(&self, _ctx: &SessionContext, name: &str) -> Result<Function> {
        self.functions
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
    }

    fn table_function(
        &self,
        _ctx: &SessionContext,
        name: &str,
    ) -> Result<Arc<dyn TableFunction>> {
        self.table_functions
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::TableFunctionNotFound(name.to_string()))
    }
}

fn builtin_functions() -> Vec<Function> {
    vec![
        Function {
            name: "upper".to_string(),
            return_type: DataType::Utf8,
            nullable: true,
            eval: Arc::new(|args| match args {
                [Value::Utf8(s)] => Ok(Value::Utf8(s.to_uppercase())),
                [Value::Null] => Ok(Value::Null),
                _ => Err(Error::InvalidArgument("upper".to_string())),
            }),
        },
        Function {
            name: "abs".to_string(),
            return_type: DataType::Int64,
            nullable: true,
            eval: Arc::new(|args| match args {
                [Value::Int64(i)] => Ok(Value::Int64(i.abs())),
                [Value::Float64(f)] => Ok(Value::Float64(f.abs())),
                [Value::Null] => Ok(Value::Null),
                _ => Err(Error::InvalidArgument("abs".to_string())),
            }),
        },
        Function {
            name: "coalesce".to_string(),
            return_type: DataType::Utf8,
            nullable: true,
            eval: Arc::new(|args| {
                Ok(args
                    .iter()
                    .find(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(Value::Null))
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{all_range, closed_range, Range};
    use quarry_common::Column;

    fn table() -> MemoryTable {
        MemoryTable::new(
            "t",
            Schema::new(vec![
                Column::new("t", "a", DataType::Int64, false),
                Column::new("t", "b", DataType::Utf8, true),
            ]),
        )
        .with_rows(vec![
            vec![Value::Int64(1), Value::Utf8("x".to_string())],
            vec![Value::Int64(2), Value::Utf8("y".to_string())],
            vec![Value::Int64(2), Value::Utf8("z".to_string())],
        ])
        .with_index("t_a", &["a"], false)
    }

    #[test]
    fn can_support_rejects_non_prefix_shapes() {
        let t = MemoryTable::new(
            "u",
            Schema::new(vec![
                Column::new("u", "x", DataType::Int64, false),
                Column::new("u", "y", DataType::Int64, false),
            ]),
        )
        .with_index("u_xy", &["x", "y"], true);
        let idx = t.indexes[0].clone();

        let prefix = RangeCollection(vec![Range(vec![
            closed_range(Value::Int64(1), Value::Int64(1), DataType::Int64),
            all_range(DataType::Int64),
        ])]);
        assert!(idx.can_support(&prefix));

        let skip = RangeCollection(vec![Range(vec![
            all_range(DataType::Int64),
            closed_range(Value::Int64(1), Value::Int64(1), DataType::Int64),
        ])]);
        assert!(!idx.can_support(&skip));
    }

    #[test]
    fn indexed_access_filters_rows() {
        let t = table();
        let idx = IndexAddressableTable::indexes(&t).remove(0);
        let lookup = IndexLookup {
            index: idx,
            ranges: RangeCollection(vec![Range(vec![closed_range(
                Value::Int64(2),
                Value::Int64(2),
                DataType::Int64,
            )])]),
            is_point_lookup: false,
            is_empty_range: false,
            is_spatial_lookup: false,
            is_reverse: false,
        };
        let view = t.indexed_access(&lookup).expect("indexed access");
        let ctx = SessionContext::new();
        let rows: Vec<Row> = view
            .lookup_partitions(&ctx, &lookup)
            .expect("partitions")
            .collect::<Result<_>>()
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r[0] == Value::Int64(2)));
    }

    #[test]
    fn catalog_resolves_versioned_snapshots() {
        let db = MemoryDatabase::new("mydb");
        db.add_table(table());
        db.add_table_version(
            "2024-01-01",
            MemoryTable::new(
                "t",
                Schema::new(vec![Column::new("t", "a", DataType::Int64, false)]),
            ),
        );
        let mut cat = MemoryCatalog::new();
        cat.add_database(db);

        let ctx = SessionContext::new();
        let (now, _) = cat.table(&ctx, "mydb", "t").expect("table");
        assert_eq!(now.schema().len(), 2);
        let (then, _) = cat
            .table_as_of(&ctx, "mydb", "t", &Value::Utf8("2024-01-01".to_string()))
            .expect("table as of");
        assert_eq!(then.schema().len(), 1);
    }

    #[test]
    fn unknown_names_surface_typed_errors() {
        let cat = MemoryCatalog::new();
        let ctx = SessionContext::new();
        assert!(matches!(
            cat.database(&ctx, "nope"),
            Err(Error::DatabaseNotFound(_))
        ));
        assert!(matches!(
            cat.function(&ctx, "nope"),
            Err(Error::FunctionNotFound(_))
        ));
    }
}
