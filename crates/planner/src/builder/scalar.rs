//! Scalar expression translation.

use std::sync::Arc;

use arrow_schema::DataType;
use quarry_common::{Error, Result, Value};
use quarry_storage::Function;
use sqlparser::ast::{
    self, BinaryOperator, Expr as SqlExpr, FunctionArg, FunctionArgExpr, FunctionArguments,
    UnaryOperator, WindowType,
};

use crate::expr::{
    BinaryOp, Expression, FrameBound, SortField, WindowDefinition, WindowFrame, WindowFrameUnits,
};
use crate::scope::Scope;

use super::PlanBuilder;

/// Aggregate function names recognized without catalog resolution.
pub(crate) const AGGREGATES: &[&str] = &["count", "sum", "avg", "min", "max"];

/// Evaluation-time function names valid as bare (unparenthesized) column
/// defaults for datetime columns.
pub(crate) const NOW_FUNCTIONS: &[&str] =
    &["now", "current_timestamp", "localtime", "localtimestamp"];

impl PlanBuilder<'_> {
    /// Translates an AST expression against a scope.
    ///
    /// Identifiers that the scope cannot bind become unresolved columns for
    /// the analyzer rather than hard errors; ambiguity is reported here.
    pub(crate) fn build_scalar(&self, scope: &Scope, e: &SqlExpr) -> Result<Expression> {
        match e {
            SqlExpr::Identifier(ident) => self.build_column(scope, None, &ident.value),
            SqlExpr::CompoundIdentifier(parts) => match parts.as_slice() {
                [t, c] => self.build_column(scope, Some(&t.value), &c.value),
                [_db, t, c] => self.build_column(scope, Some(&t.value), &c.value),
                _ => Err(Error::UnsupportedSyntax(e.to_string())),
            },
            SqlExpr::Value(v) => build_literal(v),
            SqlExpr::Nested(inner) => self.build_scalar(scope, inner),
            SqlExpr::IsNull(inner) => Ok(Expression::IsNull {
                child: Box::new(self.build_scalar(scope, inner)?),
            }),
            SqlExpr::IsNotNull(inner) => Ok(Expression::Not {
                child: Box::new(Expression::IsNull {
                    child: Box::new(self.build_scalar(scope, inner)?),
                }),
            }),
            SqlExpr::BinaryOp { left, op, right } => {
                let l = self.build_scalar(scope, left)?;
                let r = self.build_scalar(scope, right)?;
                match op {
                    BinaryOperator::And => Ok(Expression::And {
                        left: Box::new(l),
                        right: Box::new(r),
                    }),
                    BinaryOperator::Or => Ok(Expression::Or {
                        left: Box::new(l),
                        right: Box::new(r),
                    }),
                    other => {
                        let op = map_binary_op(other)
                            .ok_or_else(|| Error::UnsupportedSyntax(e.to_string()))?;
                        Ok(Expression::Binary {
                            op,
                            left: Box::new(l),
                            right: Box::new(r),
                        })
                    }
                }
            }
            SqlExpr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => Ok(Expression::Not {
                    child: Box::new(self.build_scalar(scope, expr)?),
                }),
                UnaryOperator::Plus => self.build_scalar(scope, expr),
                UnaryOperator::Minus => {
                    let child = self.build_scalar(scope, expr)?;
                    if let Expression::Literal {
                        value: Value::Int64(i),
                        data_type,
                    } = &child
                    {
                        return Ok(Expression::literal(Value::Int64(-i), data_type.clone()));
                    }
                    if let Expression::Literal {
                        value: Value::Float64(f),
                        data_type,
                    } = &child
                    {
                        return Ok(Expression::literal(Value::Float64(-f), data_type.clone()));
                    }
                    Ok(Expression::Binary {
                        op: BinaryOp::Minus,
                        left: Box::new(Expression::literal(Value::Int64(0), DataType::Int64)),
                        right: Box::new(child),
                    })
                }
                other => Err(Error::UnsupportedSyntax(format!("{other} {expr}"))),
            },
            SqlExpr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let target = self.build_scalar(scope, expr)?;
                let low = self.build_scalar(scope, low)?;
                let high = self.build_scalar(scope, high)?;
                let between = Expression::And {
                    left: Box::new(Expression::Binary {
                        op: BinaryOp::GtEq,
                        left: Box::new(target.clone()),
                        right: Box::new(low),
                    }),
                    right: Box::new(Expression::Binary {
                        op: BinaryOp::LtEq,
                        left: Box::new(target),
                        right: Box::new(high),
                    }),
                };
                Ok(if *negated {
                    Expression::Not {
                        child: Box::new(between),
                    }
                } else {
                    between
                })
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let target = self.build_scalar(scope, expr)?;
                let mut out: Option<Expression> = None;
                for item in list {
                    let eq = Expression::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(target.clone()),
                        right: Box::new(self.build_scalar(scope, item)?),
                    };
                    out = Some(match out {
                        None => eq,
                        Some(prev) => Expression::Or {
                            left: Box::new(prev),
                            right: Box::new(eq),
                        },
                    });
                }
                let folded = out.ok_or_else(|| Error::InvalidArgument("IN ()".to_string()))?;
                Ok(if *negated {
                    Expression::Not {
                        child: Box::new(folded),
                    }
                } else {
                    folded
                })
            }
            SqlExpr::Function(f) => self.build_function(scope, f),
            SqlExpr::Subquery(q) => {
                let sub_scope = scope.push();
                let mut built = self.build_query(&sub_scope, q)?;
                Ok(Expression::Subquery {
                    query: Box::new(built.take_node()?),
                })
            }
            SqlExpr::Exists { .. } => Err(Error::UnsupportedFeature(
                "EXISTS predicates".to_string(),
            )),
            SqlExpr::InSubquery { .. } => Err(Error::UnsupportedFeature(
                "IN (subquery) predicates".to_string(),
            )),
            other => Err(Error::UnsupportedSyntax(other.to_string())),
        }
    }

    fn build_column(
        &self,
        scope: &Scope,
        table: Option<&str>,
        name: &str,
    ) -> Result<Expression> {
        match scope.resolve_column(table, name)? {
            Some(col) => Ok(col.scalar_gf()),
            None => Ok(Expression::UnresolvedColumn {
                table: table.map(str::to_lowercase),
                name: name.to_lowercase(),
            }),
        }
    }

    fn build_function(&self, scope: &Scope, f: &ast::Function) -> Result<Expression> {
        let name = f
            .name
            .0
            .last()
            .map(|i| i.value.to_lowercase())
            .ok_or_else(|| Error::InvalidArgument(f.to_string()))?;

        let args = self.build_function_args(scope, &f.args)?;

        if let Some(over) = &f.over {
            let window = match over {
                WindowType::WindowSpec(spec) => self.build_window_definition(scope, spec)?,
                WindowType::NamedWindow(_) => {
                    return Err(Error::UnsupportedFeature(
                        "named window references".to_string(),
                    ))
                }
            };
            return Ok(Expression::WindowFunction { name, args, window });
        }

        if AGGREGATES.contains(&name.as_str()) {
            return Ok(aggregate_call(&name, args));
        }
        if NOW_FUNCTIONS.contains(&name.as_str()) {
            return Ok(now_call(&name, args));
        }

        let function = self.catalog.function(self.ctx, &name)?;
        Ok(Expression::FunctionCall {
            name,
            function: Some(function),
            args,
        })
    }

    fn build_function_args(
        &self,
        scope: &Scope,
        args: &FunctionArguments,
    ) -> Result<Vec<Expression>> {
        let list = match args {
            FunctionArguments::None => return Ok(vec![]),
            FunctionArguments::Subquery(_) => {
                return Err(Error::UnsupportedFeature(
                    "subquery function arguments".to_string(),
                ))
            }
            FunctionArguments::List(list) => list,
        };
        let mut out = Vec::with_capacity(list.args.len());
        for arg in &list.args {
            match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                    out.push(self.build_scalar(scope, e)?)
                }
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                    // count(*): a constant stands in for the row
                    out.push(Expression::literal(Value::Int64(1), DataType::Int64))
                }
                other => return Err(Error::UnsupportedSyntax(other.to_string())),
            }
        }
        Ok(out)
    }

    pub(crate) fn build_window_definition(
        &self,
        scope: &Scope,
        spec: &ast::WindowSpec,
    ) -> Result<WindowDefinition> {
        let mut partition_by = Vec::with_capacity(spec.partition_by.len());
        for e in &spec.partition_by {
            partition_by.push(self.build_scalar(scope, e)?);
        }
        let mut order_by = Vec::with_capacity(spec.order_by.len());
        for item in &spec.order_by {
            order_by.push(SortField {
                expr: self.build_scalar(scope, &item.expr)?,
                descending: item.asc == Some(false),
                nulls_first: item.nulls_first.unwrap_or(item.asc != Some(false)),
            });
        }
        let frame = match &spec.window_frame {
            None => None,
            Some(frame) => Some(self.build_window_frame(scope, frame)?),
        };
        Ok(WindowDefinition {
            partition_by,
            order_by,
            frame,
        })
    }

    fn build_window_frame(
        &self,
        scope: &Scope,
        frame: &ast::WindowFrame,
    ) -> Result<WindowFrame> {
        let units = match frame.units {
            ast::WindowFrameUnits::Rows => WindowFrameUnits::Rows,
            ast::WindowFrameUnits::Range => WindowFrameUnits::Range,
            ast::WindowFrameUnits::Groups => {
                return Err(Error::UnsupportedFeature("GROUPS window frames".to_string()))
            }
        };
        let start = self.build_frame_bound(scope, &frame.start_bound)?;
        let end = match &frame.end_bound {
            None => None,
            Some(bound) => Some(self.build_frame_bound(scope, bound)?),
        };
        Ok(WindowFrame::new(units, start, end))
    }

    fn build_frame_bound(&self, scope: &Scope, bound: &ast::WindowFrameBound) -> Result<FrameBound> {
        Ok(match bound {
            ast::WindowFrameBound::CurrentRow => FrameBound::CurrentRow,
            ast::WindowFrameBound::Preceding(None) => FrameBound::UnboundedPreceding,
            ast::WindowFrameBound::Following(None) => FrameBound::UnboundedFollowing,
            ast::WindowFrameBound::Preceding(Some(e)) => {
                FrameBound::Preceding(Box::new(self.build_scalar(scope, e)?))
            }
            ast::WindowFrameBound::Following(Some(e)) => {
                FrameBound::Following(Box::new(self.build_scalar(scope, e)?))
            }
        })
    }
}

/// Builds a literal expression from an AST value.
pub(crate) fn build_literal(v: &ast::Value) -> Result<Expression> {
    Ok(match v {
        ast::Value::Number(s, _) => {
            if let Ok(i) = s.parse::<i64>() {
                Expression::literal(Value::Int64(i), DataType::Int64)
            } else {
                let f = s
                    .parse::<f64>()
                    .map_err(|_| Error::Planning(format!("invalid numeric literal {s}")))?;
                Expression::literal(Value::Float64(f), DataType::Float64)
            }
        }
        ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
            Expression::literal(Value::Utf8(s.clone()), DataType::Utf8)
        }
        ast::Value::Boolean(b) => Expression::literal(Value::Boolean(*b), DataType::Boolean),
        ast::Value::Null => Expression::literal(Value::Null, DataType::Null),
        ast::Value::Placeholder(name) => Expression::BindVar {
            name: name.trim_start_matches([':', '?', '$']).to_string(),
        },
        other => return Err(Error::UnsupportedSyntax(other.to_string())),
    })
}

fn map_binary_op(op: &BinaryOperator) -> Option<BinaryOp> {
    Some(match op {
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::Spaceship => BinaryOp::NullSafeEq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        BinaryOperator::Plus => BinaryOp::Plus,
        BinaryOperator::Minus => BinaryOp::Minus,
        BinaryOperator::Multiply => BinaryOp::Multiply,
        BinaryOperator::Divide => BinaryOp::Divide,
        BinaryOperator::Modulo => BinaryOp::Modulo,
        _ => return None,
    })
}

/// An aggregate call carries a synthesized descriptor: the result type is
/// known at plan time, the evaluator belongs to the execution runtime.
fn aggregate_call(name: &str, args: Vec<Expression>) -> Expression {
    let return_type = match name {
        "count" => DataType::Int64,
        "avg" => DataType::Float64,
        _ => args
            .first()
            .map(Expression::data_type)
            .unwrap_or(DataType::Int64),
    };
    runtime_call(name, return_type, args)
}

fn now_call(name: &str, args: Vec<Expression>) -> Expression {
    runtime_call(
        name,
        DataType::Timestamp(arrow_schema::TimeUnit::Microsecond, None),
        args,
    )
}

fn runtime_call(name: &str, return_type: DataType, args: Vec<Expression>) -> Expression {
    let owned = name.to_string();
    Expression::FunctionCall {
        name: name.to_string(),
        function: Some(Function {
            name: name.to_string(),
            return_type,
            nullable: true,
            eval: Arc::new(move |_| {
                Err(Error::UnsupportedFeature(format!(
                    "{owned}() requires the execution runtime"
                )))
            }),
        }),
        args,
    }
}

/// Whether an expression subtree contains an aggregate call.
pub(crate) fn contains_aggregate(e: &Expression) -> bool {
    if let Expression::FunctionCall { name, .. } = e {
        if AGGREGATES.contains(&name.as_str()) {
            return true;
        }
    }
    e.children().iter().any(|c| contains_aggregate(c))
}

/// Whether an expression subtree contains a window function call.
pub(crate) fn contains_window(e: &Expression) -> bool {
    matches!(e, Expression::WindowFunction { .. })
        || e.children().iter().any(|c| contains_window(c))
}

/// Whether an expression subtree contains a bind variable.
pub(crate) fn contains_bind_var(e: &Expression) -> bool {
    matches!(e, Expression::BindVar { .. })
        || e.children().iter().any(|c| contains_bind_var(c))
}
