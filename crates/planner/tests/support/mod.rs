//! Shared fixtures: an in-memory catalog with tables, indexes, versioned
//! snapshots, and a table function.

#![allow(dead_code)]

use std::sync::Arc;

use arrow_schema::DataType;
use quarry_common::{Column, Result, Schema, SessionContext, Value};
use quarry_planner::{Analyzer, LogicalPlan, PlanBuilder};
use quarry_storage::memory::{MemoryCatalog, MemoryDatabase, MemoryTable};
use quarry_storage::{Table, TableFunction};

pub fn ctx() -> SessionContext {
    SessionContext::new().with_current_database("mydb")
}

pub fn catalog() -> MemoryCatalog {
    let db = MemoryDatabase::new("mydb");

    db.add_table(MemoryTable::new(
        "foo",
        Schema::new(vec![
            Column::new("foo", "a", DataType::Int64, false),
            Column::new("foo", "b", DataType::Int64, false),
        ]),
    ));

    db.add_table(MemoryTable::new(
        "t1",
        Schema::new(vec![
            Column::new("t1", "a", DataType::Int64, false),
            Column::new("t1", "b", DataType::Int64, false),
        ]),
    ));
    db.add_table(MemoryTable::new(
        "t2",
        Schema::new(vec![
            Column::new("t2", "b", DataType::Int64, false),
            Column::new("t2", "c", DataType::Int64, false),
        ]),
    ));
    db.add_table(MemoryTable::new(
        "t3",
        Schema::new(vec![
            Column::new("t3", "x", DataType::Int64, false),
            Column::new("t3", "y", DataType::Int64, false),
        ]),
    ));

    db.add_table(MemoryTable::new(
        "lt1",
        Schema::new(vec![
            Column::new("lt1", "x", DataType::Int64, false),
            Column::new("lt1", "y", DataType::Int64, false),
        ]),
    ));
    db.add_table(MemoryTable::new(
        "lt2",
        Schema::new(vec![
            Column::new("lt2", "x", DataType::Int64, false),
            Column::new("lt2", "z", DataType::Int64, false),
        ]),
    ));

    db.add_table(
        MemoryTable::new(
            "customers",
            Schema::new(vec![
                Column::new("customers", "id", DataType::Int64, false),
                Column::new("customers", "name", DataType::Utf8, true),
            ]),
        )
        .with_rows(vec![
            vec![Value::Int64(1), Value::Utf8("ada".to_string())],
            vec![Value::Int64(2), Value::Utf8("brian".to_string())],
        ])
        .with_index("customers_id", &["id"], true),
    );
    db.add_table(
        MemoryTable::new(
            "orders",
            Schema::new(vec![
                Column::new("orders", "id", DataType::Int64, false),
                Column::new("orders", "customer_id", DataType::Int64, true),
            ]),
        )
        .with_rows(vec![
            vec![Value::Int64(10), Value::Int64(1)],
            vec![Value::Int64(11), Value::Int64(1)],
            vec![Value::Int64(12), Value::Int64(2)],
        ])
        .with_index("orders_customer", &["customer_id"], false),
    );

    db.add_table(MemoryTable::new(
        "hist",
        Schema::new(vec![
            Column::new("hist", "k", DataType::Int64, false),
            Column::new("hist", "v", DataType::Utf8, true),
        ]),
    ));
    db.add_table_version(
        "2024-01-01",
        MemoryTable::new(
            "hist",
            Schema::new(vec![Column::new("hist", "k", DataType::Int64, false)]),
        ),
    );

    let mut cat = MemoryCatalog::new();
    cat.add_database(db);
    cat.register_table_function(Arc::new(SeriesFunc));
    cat
}

/// `series(n)`: one `Int64` column `n` holding `1..=n`.
#[derive(Debug)]
pub struct SeriesFunc;

impl TableFunction for SeriesFunc {
    fn name(&self) -> &str {
        "series"
    }

    fn instance(&self, args: &[Value]) -> Result<Arc<dyn Table>> {
        let n = match args.first() {
            Some(Value::Int64(n)) => *n,
            _ => 0,
        };
        let rows = (1..=n).map(|i| vec![Value::Int64(i)]).collect();
        Ok(Arc::new(
            MemoryTable::new(
                "series",
                Schema::new(vec![Column::new("series", "n", DataType::Int64, false)]),
            )
            .with_rows(rows),
        ))
    }
}

pub fn build(catalog: &MemoryCatalog, ctx: &SessionContext, sql: &str) -> Result<LogicalPlan> {
    PlanBuilder::new(ctx, catalog).build_sql(sql)
}

pub fn analyze(
    catalog: &MemoryCatalog,
    ctx: &SessionContext,
    sql: &str,
) -> Result<LogicalPlan> {
    let plan = build(catalog, ctx, sql)?;
    Analyzer::new().analyze(ctx, catalog, plan)
}
