use std::cmp::Ordering;
use std::fmt;

use arrow_schema::DataType;

use crate::error::{Error, Result};

/// A scalar value flowing through expression evaluation and index lookups.
///
/// The variant set is deliberately narrow: integral and floating numerics are
/// widened to 64 bits at evaluation time, with narrowing range checks applied
/// only when a value is converted to a declared column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
}

/// A row of scalar values, positionally aligned with a schema.
pub type Row = Vec<Value>;

impl Value {
    /// Returns whether this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The zero value of a type, used to probe index lookups before any row
    /// is available.
    pub fn zero(data_type: &DataType) -> Value {
        match data_type {
            DataType::Boolean => Value::Boolean(false),
            DataType::Utf8 | DataType::LargeUtf8 => Value::Utf8(String::new()),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Value::Float64(0.0),
            DataType::Null => Value::Null,
            _ => Value::Int64(0),
        }
    }

    /// Converts this value to the given type, checking integral range.
    ///
    /// Shape mismatches (a string where a number is required) are
    /// [`Error::IncompatibleDefaultType`]-shaped planning failures for the
    /// caller to map; narrowing overflow is [`Error::ValueOutOfRange`].
    pub fn convert(&self, data_type: &DataType) -> Result<Value> {
        match (self, data_type) {
            (Value::Null, _) => Ok(Value::Null),
            (v, DataType::Null) => Ok(v.clone()),

            (Value::Boolean(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
            (Value::Boolean(b), t) if is_integral(t) => {
                Ok(Value::Int64(i64::from(*b)))
            }

            (Value::Int64(i), t) if is_integral(t) => {
                check_integral_range(*i, t)?;
                Ok(Value::Int64(*i))
            }
            (Value::Int64(i), DataType::Float32 | DataType::Float64) => {
                Ok(Value::Float64(*i as f64))
            }
            (Value::Int64(i), DataType::Utf8 | DataType::LargeUtf8) => {
                Ok(Value::Utf8(i.to_string()))
            }

            (Value::Float64(f), DataType::Float32 | DataType::Float64) => {
                Ok(Value::Float64(*f))
            }
            (Value::Float64(f), t) if is_integral(t) => {
                let rounded = f.round();
                if rounded > i64::MAX as f64 || rounded < i64::MIN as f64 {
                    return Err(out_of_range(self, data_type));
                }
                let i = rounded as i64;
                check_integral_range(i, t)?;
                Ok(Value::Int64(i))
            }
            (Value::Float64(f), DataType::Utf8 | DataType::LargeUtf8) => {
                Ok(Value::Utf8(f.to_string()))
            }

            (Value::Utf8(s), DataType::Utf8 | DataType::LargeUtf8) => {
                Ok(Value::Utf8(s.clone()))
            }
            (Value::Utf8(s), t) if is_integral(t) => {
                let i: i64 = s
                    .trim()
                    .parse()
                    .map_err(|_| Error::Planning(format!("cannot convert '{s}' to {t}")))?;
                check_integral_range(i, t)?;
                Ok(Value::Int64(i))
            }
            (Value::Utf8(s), DataType::Float32 | DataType::Float64) => {
                let f: f64 = s
                    .trim()
                    .parse()
                    .map_err(|_| Error::Planning(format!("cannot convert '{s}' to {data_type}")))?;
                Ok(Value::Float64(f))
            }

            // Timestamp-ish targets accept their string form; deeper temporal
            // parsing belongs to the executor layer.
            (Value::Utf8(s), DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)) => {
                Ok(Value::Utf8(s.clone()))
            }

            (v, t) => Err(Error::Planning(format!("cannot convert {v} to {t}"))),
        }
    }

    /// Total ordering used for range bound comparison. NULL sorts before all
    /// other values; values of mismatched kinds compare by kind.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Int64(a), Int64(b)) => a.cmp(b),
            (Float64(a), Float64(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Int64(a), Float64(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float64(a), Int64(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Utf8(a), Utf8(b)) => a.cmp(b),
            (a, b) => kind_rank(a).cmp(&kind_rank(b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Utf8(s) => write!(f, "'{s}'"),
        }
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Int64(_) | Value::Float64(_) => 2,
        Value::Utf8(_) => 3,
    }
}

fn is_integral(t: &DataType) -> bool {
    matches!(
        t,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn check_integral_range(i: i64, t: &DataType) -> Result<()> {
    let ok = match t {
        DataType::Int8 => i >= i64::from(i8::MIN) && i <= i64::from(i8::MAX),
        DataType::Int16 => i >= i64::from(i16::MIN) && i <= i64::from(i16::MAX),
        DataType::Int32 => i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX),
        DataType::Int64 => true,
        DataType::UInt8 => i >= 0 && i <= i64::from(u8::MAX),
        DataType::UInt16 => i >= 0 && i <= i64::from(u16::MAX),
        DataType::UInt32 => i >= 0 && i <= i64::from(u32::MAX),
        DataType::UInt64 => i >= 0,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(out_of_range(&Value::Int64(i), t))
    }
}

fn out_of_range(v: &Value, t: &DataType) -> Error {
    Error::ValueOutOfRange {
        value: v.to_string(),
        data_type: t.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_widens_int_to_float() {
        let v = Value::Int64(3).convert(&DataType::Float64).expect("convert");
        assert_eq!(v, Value::Float64(3.0));
    }

    #[test]
    fn convert_narrowing_in_range() {
        let v = Value::Int64(127).convert(&DataType::Int8).expect("convert");
        assert_eq!(v, Value::Int64(127));
    }

    #[test]
    fn convert_narrowing_out_of_range() {
        let err = Value::Int64(128).convert(&DataType::Int8).expect_err("reject");
        assert!(matches!(err, Error::ValueOutOfRange { .. }), "err={err}");
    }

    #[test]
    fn convert_unsigned_rejects_negative() {
        let err = Value::Int64(-1).convert(&DataType::UInt32).expect_err("reject");
        assert!(matches!(err, Error::ValueOutOfRange { .. }), "err={err}");
    }

    #[test]
    fn convert_null_is_identity() {
        assert_eq!(Value::Null.convert(&DataType::Int8).expect("convert"), Value::Null);
    }

    #[test]
    fn zero_values_match_type_kinds() {
        assert_eq!(Value::zero(&DataType::Int32), Value::Int64(0));
        assert_eq!(Value::zero(&DataType::Utf8), Value::Utf8(String::new()));
        assert_eq!(Value::zero(&DataType::Boolean), Value::Boolean(false));
    }

    #[test]
    fn total_cmp_sorts_null_first() {
        assert_eq!(Value::Null.total_cmp(&Value::Int64(i64::MIN)), Ordering::Less);
    }
}
