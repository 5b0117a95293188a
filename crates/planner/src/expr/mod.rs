//! Scalar expression algebra.
//!
//! Every variant implements the same contract: child access, rebuild with new
//! children, resolution state, result type, nullability, and evaluation
//! against a row. The analyzer rebuilds subtrees exclusively through
//! [`Expression::with_children`], so it never needs to know a variant's
//! layout.

mod column_default;
mod eval;

use std::fmt;

use arrow_schema::DataType;
use quarry_common::{Error, Result, Row, SessionContext, Value};
use quarry_storage::Function;

pub use column_default::{ColumnDefault, ColumnDefaultValue};

use crate::plan::LogicalPlan;

/// Binary operators over scalar expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<=>`, where NULL equals NULL.
    NullSafeEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
}

impl BinaryOp {
    /// Whether the operator yields a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NullSafeEq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    fn token(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NullSafeEq => "<=>",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone)]
pub struct SortField {
    /// The sort key.
    pub expr: Expression,
    /// Descending when true.
    pub descending: bool,
    /// NULLs ordered first when true.
    pub nulls_first: bool,
}

impl SortField {
    /// An ascending sort field with NULLs first (the MySQL default).
    pub fn asc(expr: Expression) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: true,
        }
    }

    /// A descending sort field.
    pub fn desc(expr: Expression) -> Self {
        Self {
            expr,
            descending: true,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.expr,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// Frame unit for window frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrameUnits {
    /// Physical row offsets.
    Rows,
    /// Logical value offsets.
    Range,
}

/// One bound of a window frame.
#[derive(Debug, Clone)]
pub enum FrameBound {
    /// `UNBOUNDED PRECEDING`
    UnboundedPreceding,
    /// `<expr> PRECEDING`
    Preceding(Box<Expression>),
    /// `CURRENT ROW`
    CurrentRow,
    /// `<expr> FOLLOWING`
    Following(Box<Expression>),
    /// `UNBOUNDED FOLLOWING`
    UnboundedFollowing,
}

/// A window frame with both bounds always materialized.
///
/// Frames are normalized at construction: a frame written with only a start
/// bound gets `CURRENT ROW` as its end bound, so the extent predicates below
/// are total.
#[derive(Debug, Clone)]
pub struct WindowFrame {
    /// ROWS or RANGE.
    pub units: WindowFrameUnits,
    /// Start bound.
    pub start: FrameBound,
    /// End bound.
    pub end: FrameBound,
}

impl WindowFrame {
    /// Creates a frame, defaulting a missing end bound to `CURRENT ROW`.
    pub fn new(units: WindowFrameUnits, start: FrameBound, end: Option<FrameBound>) -> Self {
        Self {
            units,
            start,
            end: end.unwrap_or(FrameBound::CurrentRow),
        }
    }

    /// Whether either bound is `UNBOUNDED PRECEDING`.
    pub fn is_unbounded_preceding(&self) -> bool {
        matches!(self.start, FrameBound::UnboundedPreceding)
            || matches!(self.end, FrameBound::UnboundedPreceding)
    }

    /// Whether either bound is `UNBOUNDED FOLLOWING`.
    pub fn is_unbounded_following(&self) -> bool {
        matches!(self.start, FrameBound::UnboundedFollowing)
            || matches!(self.end, FrameBound::UnboundedFollowing)
    }
}

/// PARTITION BY / ORDER BY / frame for a window function call.
#[derive(Debug, Clone, Default)]
pub struct WindowDefinition {
    /// Partitioning expressions.
    pub partition_by: Vec<Expression>,
    /// Ordering within a partition.
    pub order_by: Vec<SortField>,
    /// Optional normalized frame.
    pub frame: Option<WindowFrame>,
}

/// A scalar expression tree.
#[derive(Debug, Clone)]
pub enum Expression {
    /// A constant value with its type.
    Literal {
        /// The value.
        value: Value,
        /// The literal's type.
        data_type: DataType,
    },
    /// A column reference not yet bound to a field position.
    UnresolvedColumn {
        /// Table qualifier, when written.
        table: Option<String>,
        /// Column name.
        name: String,
    },
    /// A resolved field reference.
    GetField {
        /// Source table or alias.
        table: String,
        /// Column name.
        name: String,
        /// Zero-based position in the input row.
        index: usize,
        /// Column type.
        data_type: DataType,
        /// Column nullability.
        nullable: bool,
    },
    /// A named expression.
    Alias {
        /// The exposed name.
        name: String,
        /// The aliased expression.
        child: Box<Expression>,
    },
    /// Arithmetic or comparison.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical conjunction.
    And {
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical disjunction.
    Or {
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical negation.
    Not {
        /// Negated expression.
        child: Box<Expression>,
    },
    /// `IS NULL`; wrap in [`Expression::Not`] for `IS NOT NULL`.
    IsNull {
        /// Tested expression.
        child: Box<Expression>,
    },
    /// A scalar function call; `function` is populated on resolution.
    FunctionCall {
        /// Function name as written, lower-cased.
        name: String,
        /// The resolved function, once the catalog has been consulted.
        function: Option<Function>,
        /// Argument expressions.
        args: Vec<Expression>,
    },
    /// A window function call.
    WindowFunction {
        /// Function name, lower-cased.
        name: String,
        /// Argument expressions.
        args: Vec<Expression>,
        /// The OVER clause.
        window: WindowDefinition,
    },
    /// A scalar subquery.
    Subquery {
        /// The subquery plan.
        query: Box<LogicalPlan>,
    },
    /// A bind-variable placeholder, resolved at execution time.
    BindVar {
        /// Placeholder name.
        name: String,
    },
    /// A column default whose expression text has not been bound yet.
    UnresolvedColumnDefault {
        /// The raw default expression text.
        expr_string: String,
    },
    /// A bound column default.
    ColumnDefault {
        /// The default value wrapper.
        default: Box<ColumnDefaultValue>,
    },
}

impl Expression {
    /// A literal expression.
    pub fn literal(value: Value, data_type: DataType) -> Expression {
        Expression::Literal { value, data_type }
    }

    /// An unqualified unresolved column.
    pub fn column(name: impl Into<String>) -> Expression {
        Expression::UnresolvedColumn {
            table: None,
            name: name.into(),
        }
    }

    /// A qualified unresolved column.
    pub fn qualified_column(table: impl Into<String>, name: impl Into<String>) -> Expression {
        Expression::UnresolvedColumn {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// The expression's children, in a stable order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal { .. }
            | Expression::UnresolvedColumn { .. }
            | Expression::GetField { .. }
            | Expression::BindVar { .. }
            | Expression::Subquery { .. }
            | Expression::UnresolvedColumnDefault { .. } => vec![],
            Expression::Alias { child, .. }
            | Expression::Not { child }
            | Expression::IsNull { child } => vec![child],
            Expression::Binary { left, right, .. }
            | Expression::And { left, right }
            | Expression::Or { left, right } => vec![left, right],
            Expression::FunctionCall { args, .. } => args.iter().collect(),
            Expression::WindowFunction { args, .. } => args.iter().collect(),
            Expression::ColumnDefault { default } => vec![&default.expr],
        }
    }

    /// Rebuilds this expression with new children.
    ///
    /// The child count must match [`Expression::children`]; a mismatch is
    /// [`Error::InvalidChildrenNumber`].
    pub fn with_children(&self, mut children: Vec<Expression>) -> Result<Expression> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(Error::InvalidChildrenNumber {
                node: self.to_string(),
                got: children.len(),
                expected,
            });
        }
        Ok(match self {
            Expression::Literal { .. }
            | Expression::UnresolvedColumn { .. }
            | Expression::GetField { .. }
            | Expression::BindVar { .. }
            | Expression::Subquery { .. }
            | Expression::UnresolvedColumnDefault { .. } => self.clone(),
            Expression::Alias { name, .. } => Expression::Alias {
                name: name.clone(),
                child: Box::new(children.remove(0)),
            },
            Expression::Not { .. } => Expression::Not {
                child: Box::new(children.remove(0)),
            },
            Expression::IsNull { .. } => Expression::IsNull {
                child: Box::new(children.remove(0)),
            },
            Expression::Binary { op, .. } => {
                let left = Box::new(children.remove(0));
                let right = Box::new(children.remove(0));
                Expression::Binary {
                    op: *op,
                    left,
                    right,
                }
            }
            Expression::And { .. } => {
                let left = Box::new(children.remove(0));
                let right = Box::new(children.remove(0));
                Expression::And { left, right }
            }
            Expression::Or { .. } => {
                let left = Box::new(children.remove(0));
                let right = Box::new(children.remove(0));
                Expression::Or { left, right }
            }
            Expression::FunctionCall { name, function, .. } => Expression::FunctionCall {
                name: name.clone(),
                function: function.clone(),
                args: children,
            },
            Expression::WindowFunction { name, window, .. } => Expression::WindowFunction {
                name: name.clone(),
                args: children,
                window: window.clone(),
            },
            Expression::ColumnDefault { default } => {
                let mut d = default.as_ref().clone();
                d.expr = children.remove(0);
                Expression::ColumnDefault {
                    default: Box::new(d),
                }
            }
        })
    }

    /// Whether every name in this subtree is bound.
    pub fn resolved(&self) -> bool {
        match self {
            Expression::UnresolvedColumn { .. }
            | Expression::BindVar { .. }
            | Expression::UnresolvedColumnDefault { .. } => false,
            Expression::FunctionCall { function, args, .. } => {
                function.is_some() && args.iter().all(Expression::resolved)
            }
            Expression::Subquery { query } => query.resolved(),
            Expression::ColumnDefault { default } => default.resolved(),
            other => other.children().iter().all(|c| c.resolved()),
        }
    }

    /// The expression's result type.
    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { data_type, .. } => data_type.clone(),
            Expression::UnresolvedColumn { .. }
            | Expression::BindVar { .. }
            | Expression::UnresolvedColumnDefault { .. } => DataType::Null,
            Expression::GetField { data_type, .. } => data_type.clone(),
            Expression::Alias { child, .. } => child.data_type(),
            Expression::Binary { op, left, right } => {
                if op.is_comparison() {
                    DataType::Boolean
                } else {
                    eval::arithmetic_type(*op, &left.data_type(), &right.data_type())
                }
            }
            Expression::And { .. } | Expression::Or { .. } | Expression::Not { .. } => {
                DataType::Boolean
            }
            Expression::IsNull { .. } => DataType::Boolean,
            Expression::FunctionCall { function, .. } => function
                .as_ref()
                .map(|f| f.return_type.clone())
                .unwrap_or(DataType::Null),
            Expression::WindowFunction { args, .. } => args
                .first()
                .map(Expression::data_type)
                .unwrap_or(DataType::Int64),
            Expression::Subquery { query } => query
                .schema()
                .column(0)
                .map(|c| c.data_type.clone())
                .unwrap_or(DataType::Null),
            Expression::ColumnDefault { default } => default.data_type(),
        }
    }

    /// Whether the expression may evaluate to NULL.
    pub fn nullable(&self) -> bool {
        match self {
            Expression::Literal { value, .. } => value.is_null(),
            Expression::GetField { nullable, .. } => *nullable,
            Expression::Alias { child, .. } => child.nullable(),
            Expression::IsNull { .. } => false,
            Expression::FunctionCall { function, .. } => {
                function.as_ref().map(|f| f.nullable).unwrap_or(true)
            }
            Expression::ColumnDefault { default } => default.nullable(),
            Expression::Binary { left, right, .. }
            | Expression::And { left, right }
            | Expression::Or { left, right } => left.nullable() || right.nullable(),
            Expression::Not { child } => child.nullable(),
            _ => true,
        }
    }

    /// Evaluates the expression against a row.
    ///
    /// Placeholder variants are unreachable in an analyzed tree; reaching one
    /// is an internal invariant violation, reported as [`Error::InAnalysis`].
    pub fn eval(&self, ctx: &SessionContext, row: &Row) -> Result<Value> {
        match self {
            Expression::Literal { value, .. } => Ok(value.clone()),
            Expression::UnresolvedColumn { table, name } => {
                debug_assert!(false, "eval called on unresolved column");
                Err(Error::InAnalysis(format!(
                    "eval called on unresolved column {}{name}",
                    table.as_deref().map(|t| format!("{t}.")).unwrap_or_default()
                )))
            }
            Expression::GetField { index, name, .. } => row.get(*index).cloned().ok_or_else(|| {
                Error::InAnalysis(format!(
                    "field {name} index {index} out of range for row of width {}",
                    row.len()
                ))
            }),
            Expression::Alias { child, .. } => child.eval(ctx, row),
            Expression::Binary { op, left, right } => {
                let l = left.eval(ctx, row)?;
                let r = right.eval(ctx, row)?;
                eval::eval_binary(*op, &l, &r)
            }
            Expression::And { left, right } => {
                eval::eval_and(left.eval(ctx, row)?, right.eval(ctx, row)?)
            }
            Expression::Or { left, right } => {
                eval::eval_or(left.eval(ctx, row)?, right.eval(ctx, row)?)
            }
            Expression::Not { child } => match child.eval(ctx, row)? {
                Value::Null => Ok(Value::Null),
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                Value::Int64(i) => Ok(Value::Boolean(i == 0)),
                other => Err(Error::Planning(format!("NOT applied to {other}"))),
            },
            Expression::IsNull { child } => {
                Ok(Value::Boolean(child.eval(ctx, row)?.is_null()))
            }
            Expression::FunctionCall { name, function, args } => {
                let function = function.as_ref().ok_or_else(|| {
                    Error::InAnalysis(format!("eval called on unresolved function {name}"))
                })?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(ctx, row)?);
                }
                (function.eval)(&values)
            }
            Expression::WindowFunction { name, .. } => Err(Error::UnsupportedFeature(format!(
                "window function {name} requires the execution runtime"
            ))),
            Expression::Subquery { .. } => Err(Error::UnsupportedFeature(
                "scalar subquery evaluation requires the execution runtime".to_string(),
            )),
            Expression::BindVar { name } => {
                debug_assert!(false, "eval called on bind variable");
                Err(Error::InAnalysis(format!(
                    "eval called on unbound variable :{name}"
                )))
            }
            Expression::UnresolvedColumnDefault { expr_string } => {
                debug_assert!(false, "eval called on unresolved column default");
                Err(Error::InAnalysis(format!(
                    "eval called on unresolved column default {expr_string}"
                )))
            }
            Expression::ColumnDefault { default } => default.eval(ctx, row),
        }
    }

    /// Debug rendering, disambiguating resolved field positions.
    pub fn debug_string(&self) -> String {
        match self {
            Expression::GetField {
                table, name, index, ..
            } => {
                if table.is_empty() {
                    format!("{name}#{index}")
                } else {
                    format!("{table}.{name}#{index}")
                }
            }
            Expression::Alias { name, child } => {
                format!("{} as {name}", child.debug_string())
            }
            Expression::Binary { op, left, right } => {
                if op.is_comparison() {
                    format!(
                        "({} {} {})",
                        left.debug_string(),
                        op.token(),
                        right.debug_string()
                    )
                } else {
                    format!(
                        "{} {} {}",
                        left.debug_string(),
                        op.token(),
                        right.debug_string()
                    )
                }
            }
            Expression::And { left, right } => {
                format!("({} AND {})", left.debug_string(), right.debug_string())
            }
            Expression::Or { left, right } => {
                format!("({} OR {})", left.debug_string(), right.debug_string())
            }
            Expression::Not { child } => format!("NOT ({})", child.debug_string()),
            Expression::IsNull { child } => format!("({} IS NULL)", child.debug_string()),
            Expression::FunctionCall { name, args, .. } => format!(
                "{name}({})",
                args.iter()
                    .map(Expression::debug_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Expression::ColumnDefault { default } => default.debug_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value, .. } => write!(f, "{value}"),
            Expression::UnresolvedColumn { table, name } => match table {
                Some(t) => write!(f, "{t}.{name}"),
                None => write!(f, "{name}"),
            },
            Expression::GetField { table, name, .. } => {
                if table.is_empty() {
                    write!(f, "{name}")
                } else {
                    write!(f, "{table}.{name}")
                }
            }
            Expression::Alias { name, child } => write!(f, "{child} as {name}"),
            // Arithmetic prints bare so a parenthesized wrapper adds exactly
            // one level of parens. TODO precedence is not reconstructed:
            // (2 + 2) / 2 renders as 2 + 2 / 2.
            Expression::Binary { op, left, right } => {
                if op.is_comparison() {
                    write!(f, "({left} {} {right})", op.token())
                } else {
                    write!(f, "{left} {} {right}", op.token())
                }
            }
            Expression::And { left, right } => write!(f, "({left} AND {right})"),
            Expression::Or { left, right } => write!(f, "({left} OR {right})"),
            Expression::Not { child } => write!(f, "NOT ({child})"),
            Expression::IsNull { child } => write!(f, "({child} IS NULL)"),
            Expression::FunctionCall { name, args, .. } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({})", rendered.join(", "))
            }
            Expression::WindowFunction { name, args, window } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{name}({}) over (", rendered.join(", "))?;
                if !window.partition_by.is_empty() {
                    let parts: Vec<String> =
                        window.partition_by.iter().map(|p| p.to_string()).collect();
                    write!(f, "partition by {}", parts.join(", "))?;
                }
                if !window.order_by.is_empty() {
                    let parts: Vec<String> =
                        window.order_by.iter().map(|o| o.to_string()).collect();
                    write!(f, " order by {}", parts.join(", "))?;
                }
                write!(f, ")")
            }
            Expression::Subquery { .. } => write!(f, "(subquery)"),
            Expression::BindVar { name } => write!(f, ":{name}"),
            Expression::UnresolvedColumnDefault { expr_string } => write!(f, "{expr_string}"),
            Expression::ColumnDefault { default } => write!(f, "{default}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_field(index: usize) -> Expression {
        Expression::GetField {
            table: "t".to_string(),
            name: "a".to_string(),
            index,
            data_type: DataType::Int64,
            nullable: false,
        }
    }

    #[test]
    fn with_children_rejects_arity_mismatch() {
        let e = Expression::Not {
            child: Box::new(get_field(0)),
        };
        let err = e.with_children(vec![]).expect_err("reject");
        assert!(matches!(
            err,
            Error::InvalidChildrenNumber {
                got: 0,
                expected: 1,
                ..
            }
        ));
    }

    #[test]
    fn with_children_is_a_pure_rewrite() {
        let e = Expression::Binary {
            op: BinaryOp::Plus,
            left: Box::new(get_field(0)),
            right: Box::new(get_field(1)),
        };
        let rebuilt = e
            .with_children(vec![get_field(2), get_field(3)])
            .expect("rebuild");
        assert_eq!(rebuilt.debug_string(), "t.a#2 + t.a#3");
        // original untouched
        assert_eq!(e.debug_string(), "t.a#0 + t.a#1");
    }

    #[test]
    fn resolved_tracks_placeholders() {
        assert!(!Expression::column("a").resolved());
        assert!(!Expression::BindVar {
            name: "v0".to_string()
        }
        .resolved());
        assert!(get_field(0).resolved());
    }

    #[test]
    fn eval_get_field_reads_row_position() {
        let ctx = SessionContext::new();
        let row = vec![Value::Int64(7), Value::Int64(9)];
        assert_eq!(get_field(1).eval(&ctx, &row).expect("eval"), Value::Int64(9));
    }

    #[test]
    fn frame_normalization_defaults_end_to_current_row() {
        let frame = WindowFrame::new(
            WindowFrameUnits::Rows,
            FrameBound::UnboundedPreceding,
            None,
        );
        assert!(matches!(frame.end, FrameBound::CurrentRow));
        assert!(frame.is_unbounded_preceding());
        assert!(!frame.is_unbounded_following());
    }
}
