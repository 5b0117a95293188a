//! Logical plan algebra.
//!
//! Plan trees are immutable by convention: rewrites produce new nodes and may
//! share unchanged subtrees. The analyzer rebuilds nodes exclusively through
//! [`LogicalPlan::with_children`] and [`LogicalPlan::with_expressions`].

mod indexed_table_access;
mod transform;

use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;
use quarry_common::{Column, Error, Result, Schema, Value};
use quarry_storage::{Database, Table};

pub use indexed_table_access::{IndexAccess, IndexedTableAccess, LookupBuilder};
pub use transform::{
    inspect, transform_expr_up, transform_expressions_up, transform_up, TreeIdentity,
};

use crate::expr::{ColumnDefault, Expression, SortField};

/// Join operators, crossed with laterality of the right side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Inner join.
    Inner,
    /// Left outer join.
    LeftOuter,
    /// Right outer join.
    RightOuter,
    /// Full outer join.
    FullOuter,
    /// Cross join.
    Cross,
    /// Inner join whose right side sees the left side's columns.
    LateralInner,
    /// Left join whose right side sees the left side's columns.
    LateralLeft,
    /// Right join with a lateral right side.
    LateralRight,
    /// Cross join with a lateral right side.
    LateralCross,
}

impl JoinType {
    /// Whether the right side is lateral.
    pub fn is_lateral(self) -> bool {
        matches!(
            self,
            JoinType::LateralInner
                | JoinType::LateralLeft
                | JoinType::LateralRight
                | JoinType::LateralCross
        )
    }

    /// The lateral counterpart of a plain join type.
    pub fn as_lateral(self) -> JoinType {
        match self {
            JoinType::Inner => JoinType::LateralInner,
            JoinType::LeftOuter => JoinType::LateralLeft,
            JoinType::RightOuter => JoinType::LateralRight,
            JoinType::Cross => JoinType::LateralCross,
            other => other,
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinType::Inner => "Inner",
            JoinType::LeftOuter => "LeftOuter",
            JoinType::RightOuter => "RightOuter",
            JoinType::FullOuter => "FullOuter",
            JoinType::Cross => "Cross",
            JoinType::LateralInner => "LateralInner",
            JoinType::LateralLeft => "LateralLeft",
            JoinType::LateralRight => "LateralRight",
            JoinType::LateralCross => "LateralCross",
        };
        write!(f, "{s}")
    }
}

/// Per-leaf options of a JSON table column.
#[derive(Debug, Clone)]
pub struct JsonTableColOpts {
    /// Output column name.
    pub name: String,
    /// Output column type.
    pub data_type: DataType,
    /// `FOR ORDINALITY` counter column.
    pub for_ordinality: bool,
    /// `EXISTS` semantics: emit 1/0 instead of the value.
    pub exists: bool,
    /// Value used when the path selects nothing.
    pub default_empty: Expression,
    /// Value used when evaluation errors.
    pub default_error: Expression,
    /// Raise instead of defaulting when the path selects nothing.
    pub error_on_empty: bool,
    /// Raise instead of defaulting when evaluation errors.
    pub error_on_error: bool,
}

/// One column spec of a JSON table; either a leaf or a nested column list
/// with its own path.
#[derive(Debug, Clone)]
pub struct JsonTableCol {
    /// JSON path for this column or nested spec.
    pub path: String,
    /// Leaf options; `None` for nested specs.
    pub opts: Option<JsonTableColOpts>,
    /// Nested columns.
    pub nested: Vec<JsonTableCol>,
}

impl JsonTableCol {
    fn leaf_columns<'a>(&'a self, out: &mut Vec<&'a JsonTableColOpts>) {
        if let Some(opts) = &self.opts {
            out.push(opts);
        }
        for col in &self.nested {
            col.leaf_columns(out);
        }
    }
}

/// A node of the logical plan tree.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// The dual table: one row, no columns.
    Dual,
    /// A table reference not yet resolved against the catalog.
    UnresolvedTable {
        /// Database qualifier; empty means the session's current database.
        database: String,
        /// Table name.
        name: String,
        /// AS OF expression, when written.
        as_of: Option<Expression>,
    },
    /// A catalog-resolved table.
    ResolvedTable {
        /// The storage table.
        table: Arc<dyn Table>,
        /// The owning database, unwrapped from privilege decorators.
        database: Option<Arc<dyn Database>>,
        /// Evaluated AS OF marker, when one was written.
        as_of: Option<Value>,
    },
    /// A resolved table whose AS OF marker is a bind variable, resolved again
    /// at execution time.
    DeferredAsOfTable {
        /// The table as resolved without the marker.
        table: Arc<dyn Table>,
        /// The owning database.
        database: Option<Arc<dyn Database>>,
        /// The deferred marker expression.
        as_of: Expression,
    },
    /// An indexed lookup against a resolved table.
    IndexedTableAccess(IndexedTableAccess),
    /// A renamed relation.
    TableAlias {
        /// The alias.
        name: String,
        /// The renamed relation.
        input: Box<LogicalPlan>,
    },
    /// A named subquery in FROM.
    SubqueryAlias {
        /// The alias.
        name: String,
        /// Optional column renames.
        columns: Vec<String>,
        /// Whether the subquery sees the columns to its left.
        lateral: bool,
        /// The subquery plan.
        input: Box<LogicalPlan>,
    },
    /// Literal rows.
    Values {
        /// Row-major expression tuples.
        rows: Vec<Vec<Expression>>,
    },
    /// A VALUES statement used as a named derived table.
    ValueDerivedTable {
        /// The alias.
        name: String,
        /// Optional column renames.
        columns: Vec<String>,
        /// Row-major expression tuples.
        rows: Vec<Vec<Expression>>,
    },
    /// A JSON_TABLE call.
    JsonTable {
        /// The JSON document expression.
        data: Expression,
        /// Root path.
        path: String,
        /// The table alias.
        alias: String,
        /// Column specs.
        columns: Vec<JsonTableCol>,
    },
    /// A table function call; `table` is populated on instantiation and left
    /// empty while arguments contain bind variables.
    TableFunction {
        /// Function name.
        name: String,
        /// Argument expressions.
        args: Vec<Expression>,
        /// The instantiated table.
        table: Option<Arc<dyn Table>>,
    },
    /// Projection.
    Project {
        /// Projected expressions.
        exprs: Vec<Expression>,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Row filter.
    Filter {
        /// The predicate.
        predicate: Expression,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Sort.
    Sort {
        /// Sort keys.
        fields: Vec<SortField>,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Row-count limit.
    Limit {
        /// Row count expression.
        limit: Expression,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Row offset.
    Offset {
        /// Offset expression.
        offset: Expression,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Grouped aggregation. `selected` is the output shape; `grouping` the
    /// GROUP BY keys.
    GroupBy {
        /// Output expressions (aggregates and keys).
        selected: Vec<Expression>,
        /// Grouping key expressions.
        grouping: Vec<Expression>,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Window function evaluation over its input.
    Window {
        /// Output expressions; window functions and passthrough fields.
        exprs: Vec<Expression>,
        /// Input.
        input: Box<LogicalPlan>,
    },
    /// Set union with optional embedded outer sort/limit/offset.
    Union {
        /// Left branch.
        left: Box<LogicalPlan>,
        /// Right branch.
        right: Box<LogicalPlan>,
        /// Whether duplicate rows are eliminated.
        distinct: bool,
        /// Outer ORDER BY, when hoisted into the union.
        sort_fields: Vec<SortField>,
        /// Outer LIMIT.
        limit: Option<Expression>,
        /// Outer OFFSET.
        offset: Option<Expression>,
    },
    /// Join.
    Join {
        /// Join operator.
        op: JoinType,
        /// Join condition; `None` for cross joins.
        condition: Option<Expression>,
        /// Left input.
        left: Box<LogicalPlan>,
        /// Right input.
        right: Box<LogicalPlan>,
    },
    /// CREATE TABLE: the target schema with per-column defaults. Statement
    /// text serialization stays outside the core.
    CreateTable {
        /// Target database; empty means the session's current database.
        database: String,
        /// Table name.
        name: String,
        /// Declared schema.
        schema: Schema,
        /// Per-column defaults, positionally aligned with the schema.
        defaults: Vec<ColumnDefault>,
    },
}

impl LogicalPlan {
    /// A short name for the node kind, used in errors and explain output.
    pub fn kind(&self) -> &'static str {
        match self {
            LogicalPlan::Dual => "Dual",
            LogicalPlan::UnresolvedTable { .. } => "UnresolvedTable",
            LogicalPlan::ResolvedTable { .. } => "Table",
            LogicalPlan::DeferredAsOfTable { .. } => "DeferredAsOfTable",
            LogicalPlan::IndexedTableAccess(_) => "IndexedTableAccess",
            LogicalPlan::TableAlias { .. } => "TableAlias",
            LogicalPlan::SubqueryAlias { .. } => "SubqueryAlias",
            LogicalPlan::Values { .. } => "Values",
            LogicalPlan::ValueDerivedTable { .. } => "ValueDerivedTable",
            LogicalPlan::JsonTable { .. } => "JsonTable",
            LogicalPlan::TableFunction { .. } => "TableFunction",
            LogicalPlan::Project { .. } => "Project",
            LogicalPlan::Filter { .. } => "Filter",
            LogicalPlan::Sort { .. } => "Sort",
            LogicalPlan::Limit { .. } => "Limit",
            LogicalPlan::Offset { .. } => "Offset",
            LogicalPlan::GroupBy { .. } => "GroupBy",
            LogicalPlan::Window { .. } => "Window",
            LogicalPlan::Union { .. } => "Union",
            LogicalPlan::Join { .. } => "Join",
            LogicalPlan::CreateTable { .. } => "CreateTable",
        }
    }

    /// The node's output schema.
    pub fn schema(&self) -> Schema {
        match self {
            LogicalPlan::Dual => Schema::empty(),
            LogicalPlan::UnresolvedTable { .. } => Schema::empty(),
            LogicalPlan::ResolvedTable { table, .. }
            | LogicalPlan::DeferredAsOfTable { table, .. } => table.schema().clone(),
            LogicalPlan::IndexedTableAccess(ita) => ita.schema().clone(),
            LogicalPlan::TableAlias { name, input } => input.schema().with_source(name),
            LogicalPlan::SubqueryAlias {
                name,
                columns,
                input,
                ..
            } => {
                let inner = input.schema().with_source(name);
                if columns.is_empty() {
                    inner
                } else {
                    inner
                        .iter()
                        .zip(columns)
                        .map(|(c, rename)| {
                            Column::new(name.clone(), rename.clone(), c.data_type.clone(), c.nullable)
                        })
                        .collect()
                }
            }
            LogicalPlan::Values { rows } => rows
                .first()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, e)| {
                            Column::new("", format!("column_{i}"), e.data_type(), e.nullable())
                        })
                        .collect()
                })
                .unwrap_or_default(),
            LogicalPlan::ValueDerivedTable { name, columns, rows } => rows
                .first()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, e)| {
                            let col_name = columns
                                .get(i)
                                .cloned()
                                .unwrap_or_else(|| format!("column_{i}"));
                            Column::new(name.clone(), col_name, e.data_type(), e.nullable())
                        })
                        .collect()
                })
                .unwrap_or_default(),
            LogicalPlan::JsonTable { alias, columns, .. } => {
                let mut leaves = Vec::new();
                for col in columns {
                    col.leaf_columns(&mut leaves);
                }
                leaves
                    .into_iter()
                    .map(|opts| {
                        Column::new(alias.clone(), opts.name.clone(), opts.data_type.clone(), true)
                    })
                    .collect()
            }
            LogicalPlan::TableFunction { table, .. } => table
                .as_ref()
                .map(|t| t.schema().clone())
                .unwrap_or_default(),
            LogicalPlan::Project { exprs, input } | LogicalPlan::Window { exprs, input } => {
                let input_schema = input.schema();
                exprs.iter().map(|e| expr_column(e, &input_schema)).collect()
            }
            LogicalPlan::GroupBy { selected, input, .. } => {
                let input_schema = input.schema();
                selected
                    .iter()
                    .map(|e| expr_column(e, &input_schema))
                    .collect()
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Offset { input, .. } => input.schema(),
            LogicalPlan::Union { left, .. } => left.schema(),
            LogicalPlan::Join { left, right, .. } => left.schema().concat(&right.schema()),
            LogicalPlan::CreateTable { .. } => Schema::empty(),
        }
    }

    /// Child nodes, in a stable order.
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Dual
            | LogicalPlan::UnresolvedTable { .. }
            | LogicalPlan::ResolvedTable { .. }
            | LogicalPlan::DeferredAsOfTable { .. }
            | LogicalPlan::IndexedTableAccess(_)
            | LogicalPlan::Values { .. }
            | LogicalPlan::ValueDerivedTable { .. }
            | LogicalPlan::JsonTable { .. }
            | LogicalPlan::TableFunction { .. }
            | LogicalPlan::CreateTable { .. } => vec![],
            LogicalPlan::TableAlias { input, .. }
            | LogicalPlan::SubqueryAlias { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Offset { input, .. }
            | LogicalPlan::GroupBy { input, .. }
            | LogicalPlan::Window { input, .. } => vec![input],
            LogicalPlan::Union { left, right, .. } | LogicalPlan::Join { left, right, .. } => {
                vec![left, right]
            }
        }
    }

    /// Rebuilds this node with new children. The child count must match
    /// [`LogicalPlan::children`].
    pub fn with_children(&self, mut children: Vec<LogicalPlan>) -> Result<LogicalPlan> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(Error::InvalidChildrenNumber {
                node: self.kind().to_string(),
                got: children.len(),
                expected,
            });
        }
        let mut take = || Box::new(children.remove(0));
        Ok(match self {
            LogicalPlan::Dual
            | LogicalPlan::UnresolvedTable { .. }
            | LogicalPlan::ResolvedTable { .. }
            | LogicalPlan::DeferredAsOfTable { .. }
            | LogicalPlan::IndexedTableAccess(_)
            | LogicalPlan::Values { .. }
            | LogicalPlan::ValueDerivedTable { .. }
            | LogicalPlan::JsonTable { .. }
            | LogicalPlan::TableFunction { .. }
            | LogicalPlan::CreateTable { .. } => self.clone(),
            LogicalPlan::TableAlias { name, .. } => LogicalPlan::TableAlias {
                name: name.clone(),
                input: take(),
            },
            LogicalPlan::SubqueryAlias {
                name,
                columns,
                lateral,
                ..
            } => LogicalPlan::SubqueryAlias {
                name: name.clone(),
                columns: columns.clone(),
                lateral: *lateral,
                input: take(),
            },
            LogicalPlan::Project { exprs, .. } => LogicalPlan::Project {
                exprs: exprs.clone(),
                input: take(),
            },
            LogicalPlan::Filter { predicate, .. } => LogicalPlan::Filter {
                predicate: predicate.clone(),
                input: take(),
            },
            LogicalPlan::Sort { fields, .. } => LogicalPlan::Sort {
                fields: fields.clone(),
                input: take(),
            },
            LogicalPlan::Limit { limit, .. } => LogicalPlan::Limit {
                limit: limit.clone(),
                input: take(),
            },
            LogicalPlan::Offset { offset, .. } => LogicalPlan::Offset {
                offset: offset.clone(),
                input: take(),
            },
            LogicalPlan::GroupBy {
                selected, grouping, ..
            } => LogicalPlan::GroupBy {
                selected: selected.clone(),
                grouping: grouping.clone(),
                input: take(),
            },
            LogicalPlan::Window { exprs, .. } => LogicalPlan::Window {
                exprs: exprs.clone(),
                input: take(),
            },
            LogicalPlan::Union {
                distinct,
                sort_fields,
                limit,
                offset,
                ..
            } => {
                let left = take();
                let right = take();
                LogicalPlan::Union {
                    left,
                    right,
                    distinct: *distinct,
                    sort_fields: sort_fields.clone(),
                    limit: limit.clone(),
                    offset: offset.clone(),
                }
            }
            LogicalPlan::Join { op, condition, .. } => {
                let left = take();
                let right = take();
                LogicalPlan::Join {
                    op: *op,
                    condition: condition.clone(),
                    left,
                    right,
                }
            }
        })
    }

    /// Whether the whole subtree is resolved: no placeholder nodes, and every
    /// expression and child resolved.
    pub fn resolved(&self) -> bool {
        let self_resolved = match self {
            LogicalPlan::UnresolvedTable { .. } | LogicalPlan::DeferredAsOfTable { .. } => false,
            LogicalPlan::TableFunction { table, .. } => table.is_some(),
            LogicalPlan::IndexedTableAccess(ita) => ita.resolved(),
            LogicalPlan::CreateTable { defaults, .. } => {
                defaults.iter().all(ColumnDefault::resolved)
            }
            _ => true,
        };
        self_resolved
            && self.expressions().iter().all(|e| e.resolved())
            && self.children().iter().all(|c| c.resolved())
    }

    /// The expressions this node owns, in a stable order. This is the seam
    /// analyzer rules rewrite through.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            LogicalPlan::UnresolvedTable { as_of, .. } => as_of.iter().collect(),
            LogicalPlan::DeferredAsOfTable { as_of, .. } => vec![as_of],
            LogicalPlan::IndexedTableAccess(ita) => ita.expressions(),
            LogicalPlan::Values { rows } | LogicalPlan::ValueDerivedTable { rows, .. } => {
                rows.iter().flatten().collect()
            }
            LogicalPlan::JsonTable { data, .. } => vec![data],
            LogicalPlan::TableFunction { args, .. } => args.iter().collect(),
            LogicalPlan::Project { exprs, .. } | LogicalPlan::Window { exprs, .. } => {
                exprs.iter().collect()
            }
            LogicalPlan::Filter { predicate, .. } => vec![predicate],
            LogicalPlan::Sort { fields, .. } => fields.iter().map(|f| &f.expr).collect(),
            LogicalPlan::Limit { limit, .. } => vec![limit],
            LogicalPlan::Offset { offset, .. } => vec![offset],
            LogicalPlan::GroupBy {
                selected, grouping, ..
            } => selected.iter().chain(grouping.iter()).collect(),
            LogicalPlan::Union {
                sort_fields,
                limit,
                offset,
                ..
            } => sort_fields
                .iter()
                .map(|f| &f.expr)
                .chain(limit.iter())
                .chain(offset.iter())
                .collect(),
            LogicalPlan::Join { condition, .. } => condition.iter().collect(),
            _ => vec![],
        }
    }

    /// Rebuilds this node with new expressions, in the order
    /// [`LogicalPlan::expressions`] returned them.
    pub fn with_expressions(&self, mut exprs: Vec<Expression>) -> Result<LogicalPlan> {
        let expected = self.expressions().len();
        if exprs.len() != expected {
            return Err(Error::InvalidChildrenNumber {
                node: self.kind().to_string(),
                got: exprs.len(),
                expected,
            });
        }
        let take = |exprs: &mut Vec<Expression>| exprs.remove(0);
        Ok(match self {
            LogicalPlan::UnresolvedTable { database, name, as_of } => LogicalPlan::UnresolvedTable {
                database: database.clone(),
                name: name.clone(),
                as_of: as_of.as_ref().map(|_| take(&mut exprs)),
            },
            LogicalPlan::DeferredAsOfTable { table, database, .. } => {
                LogicalPlan::DeferredAsOfTable {
                    table: Arc::clone(table),
                    database: database.clone(),
                    as_of: take(&mut exprs),
                }
            }
            LogicalPlan::IndexedTableAccess(ita) => {
                LogicalPlan::IndexedTableAccess(ita.with_expressions(exprs)?)
            }
            LogicalPlan::Values { rows } => LogicalPlan::Values {
                rows: rebuild_rows(rows, exprs),
            },
            LogicalPlan::ValueDerivedTable { name, columns, rows } => {
                LogicalPlan::ValueDerivedTable {
                    name: name.clone(),
                    columns: columns.clone(),
                    rows: rebuild_rows(rows, exprs),
                }
            }
            LogicalPlan::JsonTable {
                path,
                alias,
                columns,
                ..
            } => LogicalPlan::JsonTable {
                data: take(&mut exprs),
                path: path.clone(),
                alias: alias.clone(),
                columns: columns.clone(),
            },
            LogicalPlan::TableFunction { name, table, .. } => LogicalPlan::TableFunction {
                name: name.clone(),
                args: exprs,
                table: table.clone(),
            },
            LogicalPlan::Project { input, .. } => LogicalPlan::Project {
                exprs,
                input: input.clone(),
            },
            LogicalPlan::Window { input, .. } => LogicalPlan::Window {
                exprs,
                input: input.clone(),
            },
            LogicalPlan::Filter { input, .. } => LogicalPlan::Filter {
                predicate: take(&mut exprs),
                input: input.clone(),
            },
            LogicalPlan::Sort { fields, input } => LogicalPlan::Sort {
                fields: fields
                    .iter()
                    .map(|f| SortField {
                        expr: take(&mut exprs),
                        ..f.clone()
                    })
                    .collect(),
                input: input.clone(),
            },
            LogicalPlan::Limit { input, .. } => LogicalPlan::Limit {
                limit: take(&mut exprs),
                input: input.clone(),
            },
            LogicalPlan::Offset { input, .. } => LogicalPlan::Offset {
                offset: take(&mut exprs),
                input: input.clone(),
            },
            LogicalPlan::GroupBy {
                selected,
                grouping,
                input,
            } => {
                let new_selected: Vec<Expression> =
                    selected.iter().map(|_| take(&mut exprs)).collect();
                let new_grouping: Vec<Expression> =
                    grouping.iter().map(|_| take(&mut exprs)).collect();
                LogicalPlan::GroupBy {
                    selected: new_selected,
                    grouping: new_grouping,
                    input: input.clone(),
                }
            }
            LogicalPlan::Union {
                left,
                right,
                distinct,
                sort_fields,
                limit,
                offset,
            } => {
                let new_fields: Vec<SortField> = sort_fields
                    .iter()
                    .map(|f| SortField {
                        expr: take(&mut exprs),
                        ..f.clone()
                    })
                    .collect();
                LogicalPlan::Union {
                    left: left.clone(),
                    right: right.clone(),
                    distinct: *distinct,
                    sort_fields: new_fields,
                    limit: limit.as_ref().map(|_| take(&mut exprs)),
                    offset: offset.as_ref().map(|_| take(&mut exprs)),
                }
            }
            LogicalPlan::Join {
                op,
                condition,
                left,
                right,
            } => LogicalPlan::Join {
                op: *op,
                condition: condition.as_ref().map(|_| take(&mut exprs)),
                left: left.clone(),
                right: right.clone(),
            },
            other => other.clone(),
        })
    }

}

fn rebuild_rows(rows: &[Vec<Expression>], mut exprs: Vec<Expression>) -> Vec<Vec<Expression>> {
    rows.iter()
        .map(|row| exprs.drain(..row.len()).collect())
        .collect()
}

/// The output column an expression contributes to a projection-like node's
/// schema.
pub fn expr_column(e: &Expression, input: &Schema) -> Column {
    match e {
        Expression::Alias { name, child } => {
            Column::new("", name.clone(), child.data_type(), child.nullable())
        }
        Expression::GetField {
            table,
            name,
            data_type,
            nullable,
            ..
        } => Column::new(table.clone(), name.clone(), data_type.clone(), *nullable),
        Expression::UnresolvedColumn { table, name } => {
            // Best effort before resolution: borrow type information from the
            // input schema when the name is already visible there.
            match input.index_of(table.as_deref(), name) {
                Some(i) => {
                    let c = input.column(i).expect("index in range");
                    c.clone()
                }
                None => Column::new(
                    table.clone().unwrap_or_default(),
                    name.clone(),
                    DataType::Null,
                    true,
                ),
            }
        }
        other => Column::new("", other.to_string(), other.data_type(), other.nullable()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn lit(i: i64) -> Expression {
        Expression::literal(Value::Int64(i), DataType::Int64)
    }

    #[test]
    fn with_children_rejects_arity_mismatch() {
        let filter = LogicalPlan::Filter {
            predicate: lit(1),
            input: Box::new(LogicalPlan::Dual),
        };
        let err = filter
            .with_children(vec![LogicalPlan::Dual, LogicalPlan::Dual])
            .expect_err("reject");
        assert!(matches!(
            err,
            Error::InvalidChildrenNumber {
                got: 2,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn join_schema_concatenates_left_then_right() {
        let left = LogicalPlan::Values {
            rows: vec![vec![lit(1)]],
        };
        let right = LogicalPlan::Values {
            rows: vec![vec![lit(2), lit(3)]],
        };
        let join = LogicalPlan::Join {
            op: JoinType::Cross,
            condition: None,
            left: Box::new(left),
            right: Box::new(right),
        };
        assert_eq!(join.schema().len(), 3);
    }

    #[test]
    fn with_expressions_round_trips_group_by_split() {
        let gb = LogicalPlan::GroupBy {
            selected: vec![lit(1), lit(2)],
            grouping: vec![lit(3)],
            input: Box::new(LogicalPlan::Dual),
        };
        let exprs: Vec<Expression> = gb.expressions().into_iter().cloned().collect();
        assert_eq!(exprs.len(), 3);
        let rebuilt = gb.with_expressions(exprs).expect("rebuild");
        match rebuilt {
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
    fn unresolved_table_blocks_resolution() {
        let t = LogicalPlan::UnresolvedTable {
            database: String::new(),
            name: "t".to_string(),
            as_of: None,
        };
        assert!(!t.resolved());
        let filter = LogicalPlan::Filter {
            predicate: Expression::Binary {
                op: BinaryOp::Eq,
                left: Box::new(lit(1)),
                right: Box::new(lit(1)),
            },
            input: Box::new(t),
        };
        assert!(!filter.resolved());
    }
}
