mod support;

use quarry_common::Error;
use quarry_planner::{explain_logical, Expression, LogicalPlan};
use support::{build, catalog, ctx};

#[test]
fn select_star_projects_all_columns() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT * FROM foo").expect("build");
    match &plan {
        LogicalPlan::Project { exprs, input } => {
            assert_eq!(exprs.len(), 2);
            assert!(matches!(input.as_ref(), LogicalPlan::ResolvedTable { .. }));
        }
        other => panic!("expected Project, got {}", other.kind()),
    }
    assert!(plan.resolved(), "{}", explain_logical(&plan));
}

#[test]
fn building_twice_is_deterministic() {
    let cat = catalog();
    let ctx = ctx();
    let a = build(&cat, &ctx, "SELECT * FROM foo").expect("build");
    let b = build(&cat, &ctx, "SELECT * FROM foo").expect("build");
    assert_eq!(explain_logical(&a), explain_logical(&b));
}

#[test]
fn select_without_from_reads_dual() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT 1").expect("build");
    match &plan {
        LogicalPlan::Project { input, .. } => {
            assert!(matches!(input.as_ref(), LogicalPlan::Dual));
        }
        other => panic!("expected Project, got {}", other.kind()),
    }
}

#[test]
fn where_clause_becomes_filter_with_bound_columns() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a FROM foo WHERE b = 2").expect("build");
    let ex = explain_logical(&plan);
    assert!(ex.contains("Filter (foo.b#1 = 2)"), "{ex}");
}

#[test]
fn order_by_identifier_stays_unresolved_for_the_analyzer() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a, b FROM foo ORDER BY b").expect("build");
    match &plan {
        LogicalPlan::Sort { fields, .. } => {
            assert!(matches!(
                &fields[0].expr,
                Expression::UnresolvedColumn { table: None, name } if name == "b"
            ));
        }
        other => panic!("expected Sort, got {}", other.kind()),
    }
}

#[test]
fn limit_and_offset_nest_around_the_query() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a FROM foo LIMIT 10 OFFSET 5").expect("build");
    match &plan {
        LogicalPlan::Limit { input, .. } => {
            assert!(matches!(input.as_ref(), LogicalPlan::Offset { .. }));
        }
        other => panic!("expected Limit, got {}", other.kind()),
    }
}

#[test]
fn group_by_produces_group_node() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a, count(*) AS n FROM foo GROUP BY a").expect("build");
    match &plan {
        LogicalPlan::GroupBy {
            selected, grouping, ..
        } => {
            assert_eq!(selected.len(), 2);
            assert_eq!(grouping.len(), 1);
        }
        other => panic!("expected GroupBy, got {}", other.kind()),
    }
}

#[test]
fn aggregate_without_group_by_still_aggregates() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT count(*) FROM foo").expect("build");
    assert!(matches!(plan, LogicalPlan::GroupBy { .. }));
}

#[test]
fn window_function_builds_window_node() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "SELECT sum(a) OVER (PARTITION BY b ORDER BY a ROWS UNBOUNDED PRECEDING) FROM foo",
    )
    .expect("build");
    assert!(matches!(plan, LogicalPlan::Window { .. }));
}

#[test]
fn having_binds_against_the_output_row_layout() {
    let cat = catalog();
    let ctx = ctx();
    // `a` is output position 1, not its from-scope position 0
    let plan = build(
        &cat,
        &ctx,
        "SELECT b, a FROM foo GROUP BY b, a HAVING a > 1",
    )
    .expect("build");
    match &plan {
        LogicalPlan::Filter { predicate, input } => {
            assert_eq!(predicate.debug_string(), "(foo.a#1 > 1)");
            assert!(matches!(input.as_ref(), LogicalPlan::GroupBy { .. }));
        }
        other => panic!("expected Filter, got {}", other.kind()),
    }
}

#[test]
fn having_on_a_projected_alias_resolves() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "SELECT a, count(*) AS n FROM foo GROUP BY a HAVING n > 0",
    )
    .expect("build");
    let ex = explain_logical(&plan);
    assert!(ex.contains("Filter (n#1 > 0)"), "{ex}");
}

#[test]
fn having_on_a_hidden_column_gets_a_compensating_projection() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT b FROM foo HAVING a > 1").expect("build");
    let ex = explain_logical(&plan);
    // the hidden column rides behind the visible output, the filter tests it
    // there, and the outer projection restores the original shape
    assert!(ex.contains("Filter (foo.a#1 > 1)"), "{ex}");
    assert_eq!(plan.schema().len(), 1, "{ex}");
    match &plan {
        LogicalPlan::Project { exprs, input } => {
            assert_eq!(exprs[0].debug_string(), "foo.b#0");
            assert!(matches!(input.as_ref(), LogicalPlan::Filter { .. }));
        }
        other => panic!("expected Project, got {}", other.kind()),
    }
}

#[test]
fn bare_aggregate_in_having_is_unsupported() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(
        &cat,
        &ctx,
        "SELECT a FROM foo GROUP BY a HAVING count(*) > 0",
    )
    .expect_err("reject");
    assert!(matches!(err, Error::UnsupportedFeature(_)), "err={err}");
}

#[test]
fn select_distinct_is_unsupported() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(&cat, &ctx, "SELECT DISTINCT a FROM foo").expect_err("reject");
    assert!(matches!(err, Error::UnsupportedFeature(_)));
}

#[test]
fn unknown_table_is_a_typed_error() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(&cat, &ctx, "SELECT * FROM nope").expect_err("reject");
    assert!(matches!(err, Error::TableNotFound(_)));
}

#[test]
fn missing_database_selection_is_reported() {
    let cat = catalog();
    let ctx = quarry_common::SessionContext::new();
    let err = build(&cat, &ctx, "SELECT * FROM foo").expect_err("reject");
    assert!(matches!(err, Error::NoDatabaseSelected));
}

#[test]
fn union_embeds_outer_order_and_limit() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "SELECT a FROM foo UNION ALL SELECT b FROM foo ORDER BY 1 LIMIT 3",
    )
    .expect("build");
    match &plan {
        LogicalPlan::Union {
            distinct,
            sort_fields,
            limit,
            offset,
            ..
        } => {
            assert!(!*distinct);
            assert_eq!(sort_fields.len(), 1);
            assert!(limit.is_some());
            assert!(offset.is_none());
        }
        other => panic!("expected Union, got {}", other.kind()),
    }
}

#[test]
fn union_without_all_is_distinct() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a FROM foo UNION SELECT b FROM foo").expect("build");
    match &plan {
        LogicalPlan::Union {
            distinct,
            sort_fields,
            limit,
            offset,
            ..
        } => {
            assert!(*distinct);
            assert!(sort_fields.is_empty());
            assert!(limit.is_none());
            assert!(offset.is_none());
        }
        other => panic!("expected Union, got {}", other.kind()),
    }
}

#[test]
fn conflicting_union_order_by_is_rejected() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(
        &cat,
        &ctx,
        "(SELECT a FROM foo UNION SELECT b FROM foo ORDER BY 1) \
         UNION SELECT a FROM foo ORDER BY 1",
    )
    .expect_err("reject");
    assert!(
        matches!(err, Error::ConflictingExternalQuery("ORDER BY")),
        "err={err}"
    );
}

#[test]
fn conflicting_union_limit_is_rejected() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(
        &cat,
        &ctx,
        "(SELECT a FROM foo UNION SELECT b FROM foo LIMIT 2) \
         UNION SELECT a FROM foo LIMIT 1",
    )
    .expect_err("reject");
    assert!(
        matches!(err, Error::ConflictingExternalQuery("LIMIT")),
        "err={err}"
    );
}

#[test]
fn cte_reference_reuses_bound_plan() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "WITH c AS (SELECT a FROM foo) SELECT a FROM c",
    )
    .expect("build");
    let ex = explain_logical(&plan);
    assert!(ex.contains("Table(foo)"), "{ex}");
}

#[test]
fn scalar_function_resolves_through_catalog() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT upper(name) FROM customers").expect("build");
    let ex = explain_logical(&plan);
    assert!(ex.contains("upper(customers.name#1)"), "{ex}");
}

#[test]
fn unknown_function_is_a_typed_error() {
    let cat = catalog();
    let ctx = ctx();
    let err = build(&cat, &ctx, "SELECT frobnicate(a) FROM foo").expect_err("reject");
    assert!(matches!(err, Error::FunctionNotFound(_)));
}
