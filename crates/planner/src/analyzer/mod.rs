//! Rule-driven plan analysis.
//!
//! The analyzer owns an ordered rule list and drives it to a fixed point:
//! each pass applies every rule once, and the loop stops when a full pass
//! leaves the tree untouched or the configured pass bound is reached.
//! Cancellation is checked at every rule boundary.

mod apply_indexes;
mod pushdown_sort;
mod resolve_column_defaults;
mod resolve_columns;
mod resolve_orderby_literals;
mod resolve_tables;
pub mod tables;

use std::sync::Arc;

use quarry_common::{Result, SessionContext};
use quarry_storage::Catalog;
use tracing::debug;

use crate::plan::{LogicalPlan, TreeIdentity};

pub use apply_indexes::ApplyIndexes;
pub use pushdown_sort::PushdownSort;
pub use resolve_column_defaults::ResolveColumnDefaults;
pub use resolve_columns::ResolveColumns;
pub use resolve_orderby_literals::ResolveOrderbyLiterals;
pub use resolve_tables::ResolveTables;

/// Identifiers of the built-in rules, in their default execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleId {
    /// Bind unresolved table references against the catalog.
    ResolveTables,
    /// Rewrite `ORDER BY <position>` literals to column references.
    ResolveOrderbyLiterals,
    /// Move sorts below projections that hide their keys.
    PushdownSort,
    /// Bind unresolved column references against child schemas.
    ResolveColumns,
    /// Bind and type-check column defaults on schema-carrying nodes.
    ResolveColumnDefaults,
    /// Replace table scans with indexed access where filters or join keys
    /// cover an index prefix.
    ApplyIndexes,
    /// A rule registered by an integrator.
    Custom(&'static str),
}

/// One analyzer rule.
pub trait AnalyzerRule: Send + Sync {
    /// The rule's identifier.
    fn id(&self) -> RuleId;

    /// Applies the rule to a plan, reporting whether the tree changed.
    fn apply(
        &self,
        ctx: &SessionContext,
        catalog: &dyn Catalog,
        plan: LogicalPlan,
    ) -> Result<(LogicalPlan, TreeIdentity)>;
}

/// The rule registry and fixed-point driver.
pub struct Analyzer {
    rules: Vec<Arc<dyn AnalyzerRule>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// An analyzer with the default rule list.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Arc::new(ResolveTables),
                Arc::new(ResolveOrderbyLiterals),
                Arc::new(PushdownSort),
                Arc::new(ResolveColumns),
                Arc::new(ResolveColumnDefaults),
                Arc::new(ApplyIndexes),
            ],
        }
    }

    /// An analyzer with no rules; for tests driving rules individually.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule after the built-in ones.
    pub fn register_rule(&mut self, rule: Arc<dyn AnalyzerRule>) {
        self.rules.push(rule);
    }

    /// The registered rules, in execution order.
    pub fn rules(&self) -> &[Arc<dyn AnalyzerRule>] {
        &self.rules
    }

    /// Drives all rules to a fixed point over the plan.
    ///
    /// Errors cancel the loop immediately; the caller receives the error,
    /// not the partially rewritten tree.
    pub fn analyze(
        &self,
        ctx: &SessionContext,
        catalog: &dyn Catalog,
        mut plan: LogicalPlan,
    ) -> Result<LogicalPlan> {
        let max_passes = ctx.config().max_analyzer_passes.max(1);
        for pass in 0..max_passes {
            let mut pass_identity = TreeIdentity::Same;
            for rule in &self.rules {
                ctx.check_cancelled()?;
                let (next, identity) = rule.apply(ctx, catalog, plan)?;
                if identity == TreeIdentity::New {
                    debug!(rule = ?rule.id(), pass, "rule rewrote the tree");
                }
                plan = next;
                pass_identity = pass_identity.merge(identity);
            }
            if pass_identity == TreeIdentity::Same {
                break;
            }
        }
        Ok(plan)
    }
}
