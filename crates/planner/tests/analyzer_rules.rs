mod support;

use quarry_common::Error;
use quarry_planner::analyzer::{
    AnalyzerRule, PushdownSort, ResolveOrderbyLiterals,
};
use quarry_planner::{explain_logical, Analyzer, LogicalPlan};
use support::{analyze, build, catalog, ctx};

#[test]
fn analyzed_select_star_is_fully_resolved() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT * FROM foo").expect("analyze");
    assert!(plan.resolved(), "{}", explain_logical(&plan));
}

#[test]
fn order_by_positions_resolve_to_projected_columns() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 2, 1").expect("analyze");
    match &plan {
        LogicalPlan::Sort { fields, .. } => {
            assert_eq!(fields[0].expr.debug_string(), "foo.b#1");
            assert_eq!(fields[1].expr.debug_string(), "foo.a#0");
        }
        other => panic!("expected Sort, got {}", other.kind()),
    }
}

#[test]
fn order_by_zero_is_out_of_range() {
    let cat = catalog();
    let ctx = ctx();
    let err = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 0").expect_err("reject");
    assert!(matches!(err, Error::OrderByColumnIndex(0)), "err={err}");
}

#[test]
fn order_by_position_past_projection_is_out_of_range() {
    let cat = catalog();
    let ctx = ctx();
    let err = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 3").expect_err("reject");
    assert!(matches!(err, Error::OrderByColumnIndex(3)), "err={err}");
}

#[test]
fn resolve_orderby_literals_is_idempotent() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 2, 1").expect("build");
    let rule = ResolveOrderbyLiterals;
    let (once, _) = rule.apply(&ctx, &cat, plan).expect("first application");
    let before = explain_logical(&once);
    let (twice, identity) = rule.apply(&ctx, &cat, once).expect("second application");
    assert_eq!(before, explain_logical(&twice));
    assert_eq!(identity, quarry_planner::TreeIdentity::Same);
}

#[test]
fn pushdown_sort_swaps_below_projection_hiding_the_key() {
    let cat = catalog();
    let ctx = ctx();
    // `a` is not among the subquery alias outputs, so the sort moves below
    // the outer projection
    let plan = build(
        &cat,
        &ctx,
        "SELECT x FROM (SELECT a AS x FROM foo) s ORDER BY a",
    )
    .expect("build");
    let (rewritten, _) = PushdownSort.apply(&ctx, &cat, plan).expect("pushdown");
    match &rewritten {
        LogicalPlan::Project { input, .. } => match input.as_ref() {
            LogicalPlan::Sort { fields, input } => {
                assert_eq!(fields[0].expr.to_string(), "a");
                assert!(
                    matches!(input.as_ref(), LogicalPlan::SubqueryAlias { .. }),
                    "{}",
                    explain_logical(&rewritten)
                );
            }
            other => panic!("expected Sort, got {}", other.kind()),
        },
        other => panic!("expected Project, got {}", other.kind()),
    }
}

#[test]
fn pushdown_sort_leaves_visible_keys_alone() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a, b FROM foo ORDER BY b").expect("build");
    let before = explain_logical(&plan);
    let (after, identity) = PushdownSort.apply(&ctx, &cat, plan).expect("pushdown");
    assert_eq!(before, explain_logical(&after));
    assert_eq!(identity, quarry_planner::TreeIdentity::Same);
}

#[test]
fn pushdown_sort_is_idempotent_on_its_fixed_points() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "SELECT x FROM (SELECT a AS x FROM foo) s ORDER BY a",
    )
    .expect("build");
    let (once, _) = PushdownSort.apply(&ctx, &cat, plan).expect("first");
    let before = explain_logical(&once);
    let (twice, identity) = PushdownSort.apply(&ctx, &cat, once).expect("second");
    assert_eq!(before, explain_logical(&twice));
    assert_eq!(identity, quarry_planner::TreeIdentity::Same);
}

#[test]
fn equality_filter_on_indexed_column_becomes_static_lookup() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT * FROM orders WHERE customer_id = 1")
        .expect("analyze");
    let ex = explain_logical(&plan);
    assert!(ex.contains("IndexedTableAccess(orders)"), "{ex}");
    assert!(ex.contains("static={[1, 1]}"), "{ex}");
    // the filter stays above the indexed access
    assert!(ex.contains("Filter"), "{ex}");
}

#[test]
fn unique_index_full_key_is_a_point_lookup() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT * FROM customers WHERE id = 1").expect("analyze");
    let mut found = false;
    quarry_planner::plan::inspect(&plan, &mut |n| {
        if let LogicalPlan::IndexedTableAccess(ita) = n {
            let lookup = ita.static_lookup().expect("static lookup");
            assert!(lookup.is_point_lookup);
            found = true;
        }
        true
    });
    assert!(found, "{}", explain_logical(&plan));
}

#[test]
fn filter_without_index_prefix_keeps_the_scan() {
    let cat = catalog();
    let ctx = ctx();
    // orders.id is not indexed
    let plan = analyze(&cat, &ctx, "SELECT * FROM orders WHERE id = 10").expect("analyze");
    let ex = explain_logical(&plan);
    assert!(!ex.contains("IndexedTableAccess"), "{ex}");
    assert!(ex.contains("Table(orders)"), "{ex}");
}

#[test]
fn equi_join_builds_a_dynamic_lookup_on_the_right_side() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(
        &cat,
        &ctx,
        "SELECT * FROM customers JOIN orders ON customers.id = orders.customer_id",
    )
    .expect("analyze");
    let ex = explain_logical(&plan);
    assert!(ex.contains("IndexedTableAccess(orders)"), "{ex}");
    assert!(ex.contains("keys=[customers.id#0]"), "{ex}");
}

#[test]
fn analysis_stops_on_a_cancelled_context() {
    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT * FROM foo").expect("build");
    ctx.cancel();
    let err = Analyzer::new().analyze(&ctx, &cat, plan).expect_err("reject");
    assert!(matches!(err, Error::ContextCancelled));
}

#[test]
fn unresolved_reference_is_reported_with_its_name() {
    let cat = catalog();
    let ctx = ctx();
    let err = analyze(&cat, &ctx, "SELECT a FROM foo ORDER BY zzz").expect_err("reject");
    match err {
        Error::ColumnNotFound(name) => assert_eq!(name, "zzz"),
        other => panic!("expected ColumnNotFound, got {other}"),
    }
}

#[test]
fn analyzing_twice_is_stable() {
    let cat = catalog();
    let ctx = ctx();
    let once = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 2, 1").expect("analyze");
    let twice = Analyzer::new()
        .analyze(&ctx, &cat, once.clone())
        .expect("re-analyze");
    assert_eq!(explain_logical(&once), explain_logical(&twice));
}

#[test]
fn unresolved_table_nodes_resolve_through_the_catalog() {
    let cat = catalog();
    let ctx = ctx();
    let plan = LogicalPlan::UnresolvedTable {
        database: String::new(),
        name: "foo".to_string(),
        as_of: None,
    };
    assert!(!plan.resolved());
    let resolved = Analyzer::new().analyze(&ctx, &cat, plan).expect("analyze");
    assert!(matches!(resolved, LogicalPlan::ResolvedTable { .. }));
}

#[test]
fn custom_rules_run_after_the_builtin_list() {
    use quarry_common::{Result, SessionContext};
    use quarry_planner::analyzer::RuleId;
    use quarry_planner::TreeIdentity;
    use quarry_storage::Catalog;

    struct StripLimits;

    impl AnalyzerRule for StripLimits {
        fn id(&self) -> RuleId {
            RuleId::Custom("strip_limits")
        }

        fn apply(
            &self,
            _ctx: &SessionContext,
            _catalog: &dyn Catalog,
            plan: LogicalPlan,
        ) -> Result<(LogicalPlan, TreeIdentity)> {
            quarry_planner::plan::transform_up(plan, &|node| match node {
                LogicalPlan::Limit { input, .. } => Ok((*input, TreeIdentity::New)),
                other => Ok((other, TreeIdentity::Same)),
            })
        }
    }

    let cat = catalog();
    let ctx = ctx();
    let plan = build(&cat, &ctx, "SELECT a FROM foo LIMIT 5").expect("build");
    let mut analyzer = Analyzer::new();
    analyzer.register_rule(std::sync::Arc::new(StripLimits));
    let rewritten = analyzer.analyze(&ctx, &cat, plan).expect("analyze");
    let ex = explain_logical(&rewritten);
    assert!(!ex.contains("Limit"), "{ex}");
}

#[test]
fn with_table_refuses_multiple_tables() {
    use quarry_planner::analyzer::tables::with_table;

    let cat = catalog();
    let ctx = ctx();
    let plan = build(
        &cat,
        &ctx,
        "SELECT * FROM t1 JOIN t2 ON t1.b = t2.b",
    )
    .expect("build");
    let (table, _) = quarry_planner::analyzer::tables::get_resolved_table(&plan)
        .expect("resolved table");
    let err = with_table(plan, table).expect_err("reject");
    assert!(matches!(err, Error::InAnalysis(_)), "err={err}");
}

#[test]
fn expression_rewrites_preserve_sort_expressions() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 2").expect("analyze");
    // rewrite every expression identically; the tree must be unchanged
    let (same, identity) = quarry_planner::plan::transform_expressions_up(plan.clone(), &|e| {
        Ok((e, quarry_planner::TreeIdentity::Same))
    })
    .expect("walk");
    assert_eq!(identity, quarry_planner::TreeIdentity::Same);
    assert_eq!(explain_logical(&plan), explain_logical(&same));
}

#[test]
fn analyzed_plans_keep_schema_width_through_rewrites() {
    let cat = catalog();
    let ctx = ctx();
    let built = build(&cat, &ctx, "SELECT a, b FROM foo ORDER BY 2, 1").expect("build");
    let width_before = built.schema().len();
    let analyzed = Analyzer::new().analyze(&ctx, &cat, built).expect("analyze");
    assert_eq!(analyzed.schema().len(), width_before);
}

#[test]
fn order_by_expression_sorts_after_resolution() {
    let cat = catalog();
    let ctx = ctx();
    let plan = analyze(&cat, &ctx, "SELECT a, b FROM foo ORDER BY a + b").expect("analyze");
    match &plan {
        LogicalPlan::Sort { fields, .. } => {
            assert_eq!(fields[0].expr.debug_string(), "foo.a#0 + foo.b#1");
        }
        other => panic!("expected Sort, got {}", other.kind()),
    }
}
