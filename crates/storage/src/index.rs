//! Index contracts and the range algebra lookups are expressed in.
//!
//! A lookup against an index is a sequence of per-key-position column
//! ranges. The debug renderings here are stable: analyzer tests compare them
//! verbatim.

use std::fmt;
use std::sync::Arc;

use arrow_schema::DataType;
use quarry_common::Value;

/// One indexed column expression together with its type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpressionType {
    /// The column expression, e.g. `t.a`.
    pub expression: String,
    /// The column's type.
    pub data_type: DataType,
}

/// A queryable index over a table.
pub trait Index: fmt::Debug + Send + Sync {
    /// Identifier of the index, unique within its table.
    fn id(&self) -> &str;

    /// Name of the table the index belongs to.
    fn table(&self) -> &str;

    /// The indexed column expressions, in key order.
    fn expressions(&self) -> Vec<String> {
        self.column_expression_types()
            .into_iter()
            .map(|cet| cet.expression)
            .collect()
    }

    /// Whether the index enforces uniqueness over its full key.
    fn is_unique(&self) -> bool;

    /// The indexed column expressions with their types, in key order.
    fn column_expression_types(&self) -> Vec<ColumnExpressionType>;

    /// Whether this index implementation accepts the given range shape.
    fn can_support(&self, ranges: &RangeCollection) -> bool;
}

/// The constraint a lookup places on one index key position.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeColumnExpr {
    /// Any value, including NULL.
    All {
        /// Column type at this key position.
        data_type: DataType,
    },
    /// Exactly NULL.
    IsNull {
        /// Column type at this key position.
        data_type: DataType,
    },
    /// Any non-NULL value.
    IsNotNull {
        /// Column type at this key position.
        data_type: DataType,
    },
    /// The closed interval `[lower, upper]`.
    Closed {
        /// Inclusive lower bound.
        lower: Value,
        /// Inclusive upper bound.
        upper: Value,
        /// Column type at this key position.
        data_type: DataType,
    },
    /// An open interval; a missing bound is unbounded on that side.
    Open {
        /// Exclusive lower bound, when present.
        lower: Option<Value>,
        /// Exclusive upper bound, when present.
        upper: Option<Value>,
        /// Column type at this key position.
        data_type: DataType,
    },
}

/// The whole-domain range for a type.
pub fn all_range(data_type: DataType) -> RangeColumnExpr {
    RangeColumnExpr::All { data_type }
}

/// The NULL-only range for a type.
pub fn null_range(data_type: DataType) -> RangeColumnExpr {
    RangeColumnExpr::IsNull { data_type }
}

/// The not-NULL range for a type.
pub fn not_null_range(data_type: DataType) -> RangeColumnExpr {
    RangeColumnExpr::IsNotNull { data_type }
}

/// The closed interval `[lower, upper]` for a type.
pub fn closed_range(lower: Value, upper: Value, data_type: DataType) -> RangeColumnExpr {
    RangeColumnExpr::Closed {
        lower,
        upper,
        data_type,
    }
}

/// An open interval with optional bounds for a type.
pub fn open_range(
    lower: Option<Value>,
    upper: Option<Value>,
    data_type: DataType,
) -> RangeColumnExpr {
    RangeColumnExpr::Open {
        lower,
        upper,
        data_type,
    }
}

impl RangeColumnExpr {
    /// Whether the given value falls inside this range. NULL only matches
    /// `All` and `IsNull`.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            RangeColumnExpr::All { .. } => true,
            RangeColumnExpr::IsNull { .. } => value.is_null(),
            RangeColumnExpr::IsNotNull { .. } => !value.is_null(),
            RangeColumnExpr::Closed { lower, upper, .. } => {
                !value.is_null()
                    && value.total_cmp(lower) != std::cmp::Ordering::Less
                    && value.total_cmp(upper) != std::cmp::Ordering::Greater
            }
            RangeColumnExpr::Open { lower, upper, .. } => {
                if value.is_null() {
                    return false;
                }
                let above = lower
                    .as_ref()
                    .map_or(true, |lo| value.total_cmp(lo) == std::cmp::Ordering::Greater);
                let below = upper
                    .as_ref()
                    .map_or(true, |hi| value.total_cmp(hi) == std::cmp::Ordering::Less);
                above && below
            }
        }
    }

    /// Stable single-token rendering used in lookup debug strings.
    pub fn debug_string(&self) -> String {
        match self {
            RangeColumnExpr::All { .. } => "[-∞, ∞]".to_string(),
            RangeColumnExpr::IsNull { .. } => "[NULL, NULL]".to_string(),
            RangeColumnExpr::IsNotNull { .. } => "(NULL, ∞]".to_string(),
            RangeColumnExpr::Closed { lower, upper, .. } => format!("[{lower}, {upper}]"),
            RangeColumnExpr::Open { lower, upper, .. } => {
                let lo = lower
                    .as_ref()
                    .map_or("-∞".to_string(), |v| v.to_string());
                let hi = upper.as_ref().map_or("∞".to_string(), |v| v.to_string());
                format!("({lo}, {hi})")
            }
        }
    }
}

/// One range per index key position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range(pub Vec<RangeColumnExpr>);

impl Range {
    /// Number of key positions covered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the range covers no key positions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable rendering, e.g. `[1, 1], [-∞, ∞]`.
    pub fn debug_string(&self) -> String {
        self.0
            .iter()
            .map(RangeColumnExpr::debug_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An ordered collection of ranges; a lookup usually carries exactly one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeCollection(pub Vec<Range>);

impl RangeCollection {
    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no ranges.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable rendering, e.g. `{[1, 1], [-∞, ∞]}`.
    pub fn debug_string(&self) -> String {
        self.0
            .iter()
            .map(|r| format!("{{{}}}", r.debug_string()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A fully specified read intent against one index.
#[derive(Debug, Clone)]
pub struct IndexLookup {
    /// The index the lookup runs against.
    pub index: Arc<dyn Index>,
    /// Per-key-position ranges.
    pub ranges: RangeCollection,
    /// Whether the lookup identifies at most one row.
    pub is_point_lookup: bool,
    /// Whether the lookup is statically known to match nothing.
    pub is_empty_range: bool,
    /// Whether the lookup is a spatial lookup.
    pub is_spatial_lookup: bool,
    /// Whether results should be iterated in reverse key order.
    pub is_reverse: bool,
}

impl IndexLookup {
    /// Stable rendering used in plan explain output.
    pub fn debug_string(&self) -> String {
        self.ranges.debug_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_range_matches_inclusively() {
        let r = closed_range(Value::Int64(1), Value::Int64(3), DataType::Int64);
        assert!(r.matches(&Value::Int64(1)));
        assert!(r.matches(&Value::Int64(3)));
        assert!(!r.matches(&Value::Int64(4)));
        assert!(!r.matches(&Value::Null));
    }

    #[test]
    fn null_ranges_partition_on_nullness() {
        assert!(null_range(DataType::Int64).matches(&Value::Null));
        assert!(!null_range(DataType::Int64).matches(&Value::Int64(0)));
        assert!(not_null_range(DataType::Int64).matches(&Value::Int64(0)));
        assert!(!not_null_range(DataType::Int64).matches(&Value::Null));
    }

    #[test]
    fn debug_string_is_stable() {
        let range = Range(vec![
            closed_range(Value::Int64(1), Value::Int64(1), DataType::Int64),
            all_range(DataType::Utf8),
        ]);
        assert_eq!(range.debug_string(), "[1, 1], [-∞, ∞]");
        let coll = RangeCollection(vec![range]);
        assert_eq!(coll.debug_string(), "{[1, 1], [-∞, ∞]}");
    }
}
