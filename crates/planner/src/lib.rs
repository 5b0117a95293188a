//! Logical planning stack for Quarry.
//!
//! Architecture role:
//! - scope-aware translation of parsed SQL statements into logical plans
//! - rule-driven analysis (name resolution, sort rewrites, index selection)
//! - indexed table access bridging the plan tree to the storage index API
//! - column default value machinery for schema-carrying nodes
//!
//! Key modules:
//! - [`expr`]
//! - [`plan`]
//! - [`scope`]
//! - [`builder`]
//! - [`analyzer`]
//! - [`explain`]

pub mod analyzer;
pub mod builder;
pub mod explain;
pub mod expr;
pub mod plan;
pub mod scope;

pub use analyzer::{Analyzer, AnalyzerRule, RuleId};
pub use builder::PlanBuilder;
pub use explain::explain_logical;
pub use expr::{
    BinaryOp, ColumnDefault, ColumnDefaultValue, Expression, FrameBound, SortField,
    WindowDefinition, WindowFrame, WindowFrameUnits,
};
pub use plan::{
    JoinType, JsonTableCol, JsonTableColOpts, LogicalPlan, LookupBuilder, TreeIdentity,
};
