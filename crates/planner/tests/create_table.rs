mod support;

use quarry_common::{Error, SessionContext, Value};
use quarry_planner::{ColumnDefault, LogicalPlan};
use support::{build, catalog, ctx};

fn defaults_of(plan: &LogicalPlan) -> &[ColumnDefault] {
    match plan {
        LogicalPlan::CreateTable { defaults, .. } => defaults,
        other => panic!("expected CreateTable, got {}", other.kind()),
    }
}

#[test]
fn parenthesized_expression_default_keeps_its_flags() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "CREATE TABLE t (x INT DEFAULT (1+1))").expect("build");
    let defaults = defaults_of(&plan);
    match &defaults[0] {
        ColumnDefault::Explicit(v) => {
            assert!(!v.literal);
            assert!(v.parenthesized);
            assert_eq!(v.to_string(), "(1 + 1)");
        }
        ColumnDefault::Implicit => panic!("expected an explicit default"),
    }
}

#[test]
fn literal_default_prints_bare() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "CREATE TABLE t (x INT DEFAULT 3)").expect("build");
    let defaults = defaults_of(&plan);
    match &defaults[0] {
        ColumnDefault::Explicit(v) => {
            assert!(v.literal);
            assert!(!v.parenthesized);
            assert_eq!(v.to_string(), "3");
        }
        ColumnDefault::Implicit => panic!("expected an explicit default"),
    }
}

#[test]
fn missing_default_is_implicit_and_total() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "CREATE TABLE t (x INT, y TEXT)").expect("build");
    let defaults = defaults_of(&plan);
    assert!(matches!(defaults[0], ColumnDefault::Implicit));
    assert_eq!(
        defaults[1].eval(&ctx, &Vec::new()).expect("eval"),
        Value::Null
    );
    assert!(defaults[1].is_literal());
    assert!(defaults[1].resolved());
}

#[test]
fn bare_current_timestamp_is_valid_for_datetime_columns() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "CREATE TABLE t (created TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
    )
    .expect("build");
    let defaults = defaults_of(&plan);
    match &defaults[0] {
        ColumnDefault::Explicit(v) => {
            assert!(!v.literal);
            assert!(!v.parenthesized);
            assert!(v.debug_string().starts_with('('), "{}", v.debug_string());
        }
        ColumnDefault::Implicit => panic!("expected an explicit default"),
    }
}

#[test]
fn bare_current_timestamp_is_invalid_elsewhere() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(
        &cat,
        &ctx,
        "CREATE TABLE t (x INT DEFAULT CURRENT_TIMESTAMP)",
    )
    .expect_err("reject");
    assert!(matches!(err, Error::InvalidArgument(_)), "err={err}");
}

#[test]
fn parenthesized_now_is_valid_for_any_column() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "CREATE TABLE t (x TEXT DEFAULT (NOW()))",
    )
    .expect("build");
    let defaults = defaults_of(&plan);
    match &defaults[0] {
        ColumnDefault::Explicit(v) => {
            assert!(v.parenthesized);
            assert!(v.debug_string().starts_with("parenthesized("));
        }
        ColumnDefault::Implicit => panic!("expected an explicit default"),
    }
}

#[test]
fn incompatible_literal_default_fails_the_type_probe() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(&cat, &ctx, "CREATE TABLE t (x INT DEFAULT 'abc')").expect_err("reject");
    assert!(matches!(err, Error::IncompatibleDefaultType), "err={err}");
}

#[test]
fn not_null_column_rejects_null_literal_default() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(
        &cat,
        &ctx,
        "CREATE TABLE t (x INT NOT NULL DEFAULT NULL)",
    )
    .expect_err("reject");
    assert!(matches!(err, Error::IncompatibleDefaultType), "err={err}");
}

#[test]
fn expression_default_evaluates_with_coercion() {
    let cat = catalog();
    let ctx = SessionContext::new().with_current_database("mydb");
    let plan = build(&cat, &ctx, "CREATE TABLE t (x DOUBLE DEFAULT (1+1))").expect("build");
    let defaults = defaults_of(&plan);
    assert_eq!(
        defaults[0].eval(&ctx, &Vec::new()).expect("eval"),
        Value::Float64(2.0)
    );
}

#[test]
fn create_table_schema_carries_names_and_nullability() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "CREATE TABLE t (id BIGINT PRIMARY KEY, name TEXT)",
    )
    .expect("build");
    match &plan {
        LogicalPlan::CreateTable { schema, name, .. } => {
            assert_eq!(name, "t");
            assert!(!schema.column(0).expect("id").nullable);
            assert!(schema.column(1).expect("name").nullable);
        }
        other => panic!("expected CreateTable, got {}", other.kind()),
    }
}
