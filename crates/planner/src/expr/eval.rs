//! Binary operator evaluation and arithmetic result typing.

use std::cmp::Ordering;

use arrow_schema::DataType;
use quarry_common::{Error, Result, Value};

use super::BinaryOp;

/// Result type of an arithmetic operator over the given operand types.
///
/// Division always widens to float; otherwise any float operand makes the
/// result float.
pub(crate) fn arithmetic_type(op: BinaryOp, left: &DataType, right: &DataType) -> DataType {
    if op == BinaryOp::Divide {
        return DataType::Float64;
    }
    let float = |t: &DataType| {
        matches!(t, DataType::Float16 | DataType::Float32 | DataType::Float64)
    };
    if float(left) || float(right) {
        DataType::Float64
    } else {
        DataType::Int64
    }
}

/// Evaluates a binary operator over two values.
///
/// NULL propagates through every operator except `<=>`, which treats NULL as
/// comparable with NULL.
pub(crate) fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if op == BinaryOp::NullSafeEq {
        return Ok(Value::Boolean(match (left, right) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => left.total_cmp(right) == Ordering::Equal,
        }));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if op.is_comparison() {
        let ord = left.total_cmp(right);
        let b = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::GtEq => ord != Ordering::Less,
            _ => unreachable!("comparison op"),
        };
        return Ok(Value::Boolean(b));
    }
    eval_arithmetic(op, left, right)
}

fn eval_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    if op == BinaryOp::Divide {
        let (l, r) = (as_f64(left)?, as_f64(right)?);
        if r == 0.0 {
            return Ok(Value::Null);
        }
        return Ok(Value::Float64(l / r));
    }
    match (left, right) {
        (Value::Int64(l), Value::Int64(r)) => {
            let out = match op {
                BinaryOp::Plus => l.checked_add(*r),
                BinaryOp::Minus => l.checked_sub(*r),
                BinaryOp::Multiply => l.checked_mul(*r),
                BinaryOp::Modulo => {
                    if *r == 0 {
                        return Ok(Value::Null);
                    }
                    l.checked_rem(*r)
                }
                _ => unreachable!("arithmetic op"),
            };
            out.map(Value::Int64).ok_or_else(|| Error::ValueOutOfRange {
                value: format!("{left} {} {right}", token(op)),
                data_type: DataType::Int64.to_string(),
            })
        }
        _ => {
            let (l, r) = (as_f64(left)?, as_f64(right)?);
            let out = match op {
                BinaryOp::Plus => l + r,
                BinaryOp::Minus => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Modulo => {
                    if r == 0.0 {
                        return Ok(Value::Null);
                    }
                    l % r
                }
                _ => unreachable!("arithmetic op"),
            };
            Ok(Value::Float64(out))
        }
    }
}

pub(crate) fn eval_and(left: Value, right: Value) -> Result<Value> {
    match (truthy(&left)?, truthy(&right)?) {
        (Some(false), _) | (_, Some(false)) => Ok(Value::Boolean(false)),
        (Some(true), Some(true)) => Ok(Value::Boolean(true)),
        _ => Ok(Value::Null),
    }
}

pub(crate) fn eval_or(left: Value, right: Value) -> Result<Value> {
    match (truthy(&left)?, truthy(&right)?) {
        (Some(true), _) | (_, Some(true)) => Ok(Value::Boolean(true)),
        (Some(false), Some(false)) => Ok(Value::Boolean(false)),
        _ => Ok(Value::Null),
    }
}

fn truthy(v: &Value) -> Result<Option<bool>> {
    match v {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Int64(i) => Ok(Some(*i != 0)),
        Value::Float64(f) => Ok(Some(*f != 0.0)),
        other => Err(Error::Planning(format!("{other} is not a boolean"))),
    }
}

fn as_f64(v: &Value) -> Result<f64> {
    match v {
        Value::Int64(i) => Ok(*i as f64),
        Value::Float64(f) => Ok(*f),
        Value::Boolean(b) => Ok(f64::from(*b)),
        other => Err(Error::Planning(format!("{other} is not numeric"))),
    }
}

fn token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Modulo => "%",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_safe_eq_matches_nulls() {
        assert_eq!(
            eval_binary(BinaryOp::NullSafeEq, &Value::Null, &Value::Null).expect("eval"),
            Value::Boolean(true)
        );
        assert_eq!(
            eval_binary(BinaryOp::NullSafeEq, &Value::Null, &Value::Int64(1)).expect("eval"),
            Value::Boolean(false)
        );
    }

    #[test]
    fn plain_comparison_propagates_null() {
        assert_eq!(
            eval_binary(BinaryOp::Eq, &Value::Null, &Value::Int64(1)).expect("eval"),
            Value::Null
        );
    }

    #[test]
    fn division_widens_and_guards_zero() {
        assert_eq!(
            eval_binary(BinaryOp::Divide, &Value::Int64(3), &Value::Int64(2)).expect("eval"),
            Value::Float64(1.5)
        );
        assert_eq!(
            eval_binary(BinaryOp::Divide, &Value::Int64(3), &Value::Int64(0)).expect("eval"),
            Value::Null
        );
    }

    #[test]
    fn three_valued_and_or() {
        assert_eq!(
            eval_and(Value::Null, Value::Boolean(false)).expect("and"),
            Value::Boolean(false)
        );
        assert_eq!(eval_and(Value::Null, Value::Boolean(true)).expect("and"), Value::Null);
        assert_eq!(
            eval_or(Value::Null, Value::Boolean(true)).expect("or"),
            Value::Boolean(true)
        );
        assert_eq!(eval_or(Value::Null, Value::Boolean(false)).expect("or"), Value::Null);
    }

    #[test]
    fn int_overflow_is_out_of_range() {
        let err =
            eval_binary(BinaryOp::Plus, &Value::Int64(i64::MAX), &Value::Int64(1)).expect_err("reject");
        assert!(matches!(err, Error::ValueOutOfRange { .. }));
    }
}
