//! Column default value machinery.
//!
//! A default is either implicit (nothing declared; evaluates to NULL with
//! every predicate total) or an explicit literal/expression with an optional
//! coercion target. The `parenthesized` flag is carried separately from
//! `literal` because `CURRENT_TIMESTAMP` without parens is a valid default
//! for datetime-like columns while every other expression default must be
//! parenthesized.

use std::fmt;

use arrow_schema::DataType;
use quarry_common::{Error, Result, Row, SessionContext, Value};

use super::Expression;

/// A column's declared default.
#[derive(Debug, Clone)]
pub enum ColumnDefault {
    /// No default declared. Evaluates to NULL; every predicate is total.
    Implicit,
    /// A declared default.
    Explicit(ColumnDefaultValue),
}

impl Default for ColumnDefault {
    fn default() -> Self {
        ColumnDefault::Implicit
    }
}

impl ColumnDefault {
    /// Evaluates the default for a row.
    pub fn eval(&self, ctx: &SessionContext, row: &Row) -> Result<Value> {
        match self {
            ColumnDefault::Implicit => Ok(Value::Null),
            ColumnDefault::Explicit(v) => v.eval(ctx, row),
        }
    }

    /// Whether this default is a literal. The implicit default counts as the
    /// literal NULL.
    pub fn is_literal(&self) -> bool {
        match self {
            ColumnDefault::Implicit => true,
            ColumnDefault::Explicit(v) => v.literal,
        }
    }

    /// Whether the default was written in parentheses.
    pub fn is_parenthesized(&self) -> bool {
        match self {
            ColumnDefault::Implicit => false,
            ColumnDefault::Explicit(v) => v.parenthesized,
        }
    }

    /// Whether the default may produce NULL.
    pub fn nullable(&self) -> bool {
        match self {
            ColumnDefault::Implicit => true,
            ColumnDefault::Explicit(v) => v.may_return_nil && v.expr.nullable(),
        }
    }

    /// Whether the default is fully bound.
    pub fn resolved(&self) -> bool {
        match self {
            ColumnDefault::Implicit => true,
            ColumnDefault::Explicit(v) => v.resolved(),
        }
    }

    /// The default's result type; NULL for the implicit default.
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnDefault::Implicit => DataType::Null,
            ColumnDefault::Explicit(v) => v.data_type(),
        }
    }

    /// Compile-time probe for literal defaults. See
    /// [`ColumnDefaultValue::check_type`].
    pub fn check_type(&self, ctx: &SessionContext) -> Result<()> {
        match self {
            ColumnDefault::Implicit => Ok(()),
            ColumnDefault::Explicit(v) => v.check_type(ctx),
        }
    }

    /// Debug rendering; empty for the implicit default.
    pub fn debug_string(&self) -> String {
        match self {
            ColumnDefault::Implicit => String::new(),
            ColumnDefault::Explicit(v) => v.debug_string(),
        }
    }
}

impl fmt::Display for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Implicit => Ok(()),
            ColumnDefault::Explicit(v) => write!(f, "{v}"),
        }
    }
}

/// An explicit column default: the inner expression plus coercion and policy
/// flags.
#[derive(Debug, Clone)]
pub struct ColumnDefaultValue {
    /// The default's expression.
    pub expr: Expression,
    /// Coercion target; the column's type once the default is bound.
    pub out_type: Option<DataType>,
    /// Whether the default is a literal constant rather than an expression.
    pub literal: bool,
    /// Whether the default was written in parentheses.
    pub parenthesized: bool,
    /// When false, a NULL evaluation result is an error rather than NULL.
    pub may_return_nil: bool,
}

impl ColumnDefaultValue {
    /// Creates a default value wrapper.
    pub fn new(
        expr: Expression,
        out_type: Option<DataType>,
        literal: bool,
        parenthesized: bool,
        may_return_nil: bool,
    ) -> Self {
        Self {
            expr,
            out_type,
            literal,
            parenthesized,
            may_return_nil,
        }
    }

    /// Evaluates the default: inner expression, NULL policy, then coercion.
    pub fn eval(&self, ctx: &SessionContext, row: &Row) -> Result<Value> {
        let val = self.expr.eval(ctx, row)?;
        if val.is_null() && !self.may_return_nil {
            return Err(Error::ColumnDefaultReturnedNull);
        }
        match &self.out_type {
            None => Ok(val),
            Some(t) => match val.convert(t) {
                Ok(v) => Ok(v),
                Err(e @ Error::ValueOutOfRange { .. }) => Err(e),
                Err(_) => Err(Error::IncompatibleDefaultType),
            },
        }
    }

    /// The default's result type: the coercion target when set, else the
    /// expression's type.
    pub fn data_type(&self) -> DataType {
        self.out_type
            .clone()
            .unwrap_or_else(|| self.expr.data_type())
    }

    /// Whether the default may produce NULL.
    pub fn nullable(&self) -> bool {
        self.may_return_nil && self.expr.nullable()
    }

    /// A default is resolved once it has an output type and a resolved
    /// expression.
    pub fn resolved(&self) -> bool {
        self.out_type.is_some() && self.expr.resolved()
    }

    /// Validates a literal default against its output type without side
    /// effects, for DDL-time checking. Non-literal defaults are skipped: they
    /// may reference evaluation-time state.
    pub fn check_type(&self, ctx: &SessionContext) -> Result<()> {
        if self.out_type.is_none() || !self.literal {
            return Ok(());
        }
        let val = self.expr.eval(ctx, &Vec::new())?;
        if val.is_null() && !self.may_return_nil {
            return Err(Error::IncompatibleDefaultType);
        }
        let out_type = self.out_type.as_ref().expect("out_type checked above");
        val.convert(out_type)
            .map(|_| ())
            .map_err(|_| Error::IncompatibleDefaultType)
    }

    /// Debug rendering preserving the parenthesized flag, so the
    /// `CURRENT_TIMESTAMP` edge case stays visible in plan dumps.
    pub fn debug_string(&self) -> String {
        if self.literal {
            self.expr.debug_string()
        } else if self.parenthesized {
            format!("parenthesized({})", self.expr.debug_string())
        } else {
            format!("({})", self.expr.debug_string())
        }
    }
}

impl fmt::Display for ColumnDefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A literal default prints bare; an expression default prints inside
        // parentheses, matching how it must be re-declared.
        if self.literal {
            write!(f, "{}", self.expr)
        } else {
            write!(f, "({})", self.expr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn lit(v: Value) -> Expression {
        let t = match &v {
            Value::Int64(_) => DataType::Int64,
            Value::Utf8(_) => DataType::Utf8,
            _ => DataType::Null,
        };
        Expression::literal(v, t)
    }

    #[test]
    fn implicit_default_is_total() {
        let ctx = SessionContext::new();
        let d = ColumnDefault::Implicit;
        assert_eq!(d.eval(&ctx, &Vec::new()).expect("eval"), Value::Null);
        assert!(d.is_literal());
        assert!(!d.is_parenthesized());
        assert!(d.nullable());
        assert!(d.resolved());
        assert_eq!(d.to_string(), "");
        assert_eq!(d.debug_string(), "");
    }

    #[test]
    fn null_result_errors_when_not_allowed() {
        let ctx = SessionContext::new();
        let d = ColumnDefaultValue::new(lit(Value::Null), Some(DataType::Int64), true, false, false);
        let err = d.eval(&ctx, &Vec::new()).expect_err("reject");
        assert!(matches!(err, Error::ColumnDefaultReturnedNull));
    }

    #[test]
    fn conversion_applies_out_type() {
        let ctx = SessionContext::new();
        let d = ColumnDefaultValue::new(
            lit(Value::Int64(3)),
            Some(DataType::Float64),
            true,
            false,
            true,
        );
        assert_eq!(d.eval(&ctx, &Vec::new()).expect("eval"), Value::Float64(3.0));
    }

    #[test]
    fn out_of_range_conversion_keeps_its_code() {
        let ctx = SessionContext::new();
        let d = ColumnDefaultValue::new(
            lit(Value::Int64(300)),
            Some(DataType::Int8),
            true,
            false,
            true,
        );
        let err = d.eval(&ctx, &Vec::new()).expect_err("reject");
        assert!(matches!(err, Error::ValueOutOfRange { .. }));
    }

    #[test]
    fn incompatible_conversion_maps_to_default_error() {
        let ctx = SessionContext::new();
        let d = ColumnDefaultValue::new(
            lit(Value::Utf8("abc".to_string())),
            Some(DataType::Int64),
            true,
            false,
            true,
        );
        let err = d.eval(&ctx, &Vec::new()).expect_err("reject");
        assert!(matches!(err, Error::IncompatibleDefaultType));
    }

    #[test]
    fn check_type_probes_literals_only() {
        let ctx = SessionContext::new();
        let bad = ColumnDefaultValue::new(
            lit(Value::Utf8("abc".to_string())),
            Some(DataType::Int64),
            true,
            false,
            true,
        );
        assert!(matches!(
            bad.check_type(&ctx),
            Err(Error::IncompatibleDefaultType)
        ));

        // expression defaults are not probed
        let expr = ColumnDefaultValue::new(
            lit(Value::Utf8("abc".to_string())),
            Some(DataType::Int64),
            false,
            true,
            true,
        );
        assert!(expr.check_type(&ctx).is_ok());
    }

    #[test]
    fn display_distinguishes_literal_and_expression() {
        let add = Expression::Binary {
            op: BinaryOp::Plus,
            left: Box::new(lit(Value::Int64(1))),
            right: Box::new(lit(Value::Int64(1))),
        };
        let expr_default =
            ColumnDefaultValue::new(add, Some(DataType::Int64), false, true, true);
        assert_eq!(expr_default.to_string(), "(1 + 1)");
        assert!(expr_default.debug_string().starts_with("parenthesized("));

        let lit_default =
            ColumnDefaultValue::new(lit(Value::Int64(3)), Some(DataType::Int64), true, false, true);
        assert_eq!(lit_default.to_string(), "3");
    }
}
