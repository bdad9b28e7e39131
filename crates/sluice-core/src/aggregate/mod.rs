//! Pluggable aggregate accumulators.
//!
//! A window view's query names one or more aggregate functions; each is
//! resolved at CREATE time into an [`AggregateFactory`] that stamps out one
//! [`AggregateAccumulator`] per (window, group key) pair. Accumulators are
//! object-safe so a view can carry a heterogeneous list of them behind
//! `Box<dyn AggregateAccumulator>`.
//!
//! The built-in accumulators (COUNT/SUM/MIN/MAX/AVG) are incremental and
//! order-insensitive: feeding the same rows in any arrival order produces
//! the same finalized result.

mod builtins;

pub use builtins::{
    AvgFloat64Accumulator, AvgInt64Accumulator, CountAccumulator, MaxFloat64Accumulator,
    MaxInt64Accumulator, MinFloat64Accumulator, MinInt64Accumulator, SumFloat64Accumulator,
    SumInt64Accumulator,
};

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};

use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type, TimestampMillisecondType};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::{DataType, Field, TimeUnit};

use crate::{Error, Result};

/// A single scalar value, used for group keys and finalized aggregates.
///
/// Unlike Arrow scalars this type is hashable: floats hash and compare by
/// bit pattern, which is exactly what a GROUP BY key needs (two NaNs with
/// the same bits land in the same group).
#[derive(Debug, Clone)]
pub enum ScalarValue {
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

impl ScalarValue {
    /// Returns true for NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The Arrow data type this value materializes as.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    /// Reads the value at `row` from an Arrow array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedColumnType`] for array types that cannot
    /// be a group key or aggregate result.
    pub fn from_array(column: &ArrayRef, row: usize, name: &str) -> Result<Self> {
        if column.is_null(row) {
            return Ok(Self::Null);
        }
        match column.data_type() {
            DataType::Boolean => Ok(Self::Boolean(column.as_boolean().value(row))),
            DataType::Int64 => Ok(Self::Int64(column.as_primitive::<Int64Type>().value(row))),
            DataType::Float64 => Ok(Self::Float64(
                column.as_primitive::<Float64Type>().value(row),
            )),
            DataType::Utf8 => Ok(Self::Utf8(column.as_string::<i32>().value(row).to_string())),
            DataType::Timestamp(TimeUnit::Millisecond, _) => Ok(Self::Int64(
                column.as_primitive::<TimestampMillisecondType>().value(row),
            )),
            other => Err(Error::UnsupportedColumnType {
                column: name.to_string(),
                data_type: other.clone(),
                position: "group key",
            }),
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Boolean(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Utf8(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// Per-window, per-group partial aggregate state.
///
/// `update` consumes one source row; `merge` absorbs another accumulator
/// of the same concrete type (used when a failed flush is merged back over
/// freshly-created state); `finalize` produces the output value without
/// consuming the state, so a failed destination write can retry later.
pub trait AggregateAccumulator: Send {
    /// Folds the value(s) of row `row` of `batch` into the state.
    fn update(&mut self, batch: &RecordBatch, row: usize);

    /// Merges another accumulator of the same concrete type into this one.
    ///
    /// Mismatched types are ignored; the built-in factories always pair
    /// accumulators position-by-position so a mismatch cannot happen in
    /// practice.
    fn merge(&mut self, other: &dyn AggregateAccumulator);

    /// Returns the finalized aggregate value.
    fn finalize(&self) -> ScalarValue;

    /// Returns true if no values have been folded in.
    fn is_empty(&self) -> bool;

    /// Self as `Any`, for `merge` downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Factory producing accumulators for one aggregate of one view.
///
/// Selected at CREATE time; one factory per entry in the view's aggregate
/// list.
pub trait AggregateFactory: Send + Sync {
    /// Creates an empty accumulator.
    fn create(&self) -> Box<dyn AggregateAccumulator>;

    /// The destination-table field this aggregate produces.
    fn result_field(&self) -> Field;
}

/// The aggregate functions the engine ships accumulators for.
///
/// Dispatch over the function kind happens here once, at CREATE time,
/// not per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// `COUNT(*)` or `COUNT(col)` (non-null count).
    Count,
    /// `SUM(col)` over Int64 or Float64.
    Sum,
    /// `MIN(col)` over Int64 or Float64.
    Min,
    /// `MAX(col)` over Int64 or Float64.
    Max,
    /// `AVG(col)` over Int64 or Float64; always a Float64 result.
    Avg,
}

impl AggregateFunction {
    /// Parses a function name as it appears in a view's query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAggregateFunction`] for names with no
    /// accumulator.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "avg" => Ok(Self::Avg),
            _ => Err(Error::UnknownAggregateFunction(name.to_string())),
        }
    }

    /// The lowercase SQL name of the function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        }
    }

    /// Resolves the function against its (optional) input column into a
    /// factory, at CREATE time.
    ///
    /// `column` is `(index, data_type, name)` of the resolved argument
    /// column in the source schema, or `None` for `COUNT(*)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAggregateColumn`] when a column-consuming
    /// function has no argument, or [`Error::UnsupportedColumnType`] when
    /// the argument type has no accumulator.
    pub fn resolve(
        &self,
        alias: &str,
        column: Option<(usize, &DataType, &str)>,
    ) -> Result<Box<dyn AggregateFactory>> {
        if let Self::Count = self {
            return Ok(Box::new(builtins::CountFactory::new(
                column.map(|(idx, _, _)| idx),
                alias,
            )));
        }

        let (index, data_type, name) =
            column.ok_or_else(|| Error::MissingAggregateColumn(self.name().to_string()))?;

        match (self, data_type) {
            (Self::Sum, DataType::Int64) => {
                Ok(Box::new(builtins::SumInt64Factory::new(index, alias)))
            }
            (Self::Sum, DataType::Float64) => {
                Ok(Box::new(builtins::SumFloat64Factory::new(index, alias)))
            }
            (Self::Min, DataType::Int64) => {
                Ok(Box::new(builtins::MinInt64Factory::new(index, alias)))
            }
            (Self::Min, DataType::Float64) => {
                Ok(Box::new(builtins::MinFloat64Factory::new(index, alias)))
            }
            (Self::Max, DataType::Int64) => {
                Ok(Box::new(builtins::MaxInt64Factory::new(index, alias)))
            }
            (Self::Max, DataType::Float64) => {
                Ok(Box::new(builtins::MaxFloat64Factory::new(index, alias)))
            }
            (Self::Avg, DataType::Int64) => {
                Ok(Box::new(builtins::AvgInt64Factory::new(index, alias)))
            }
            (Self::Avg, DataType::Float64) => {
                Ok(Box::new(builtins::AvgFloat64Factory::new(index, alias)))
            }
            (_, other) => Err(Error::UnsupportedColumnType {
                column: name.to_string(),
                data_type: other.clone(),
                position: "aggregate input",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &ScalarValue) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_parse_known_functions() {
        assert_eq!(AggregateFunction::parse("count").unwrap(), AggregateFunction::Count);
        assert_eq!(AggregateFunction::parse("SUM").unwrap(), AggregateFunction::Sum);
        assert_eq!(AggregateFunction::parse("Avg").unwrap(), AggregateFunction::Avg);
    }

    #[test]
    fn test_parse_unknown_function() {
        let err = AggregateFunction::parse("median").unwrap_err();
        assert!(matches!(err, Error::UnknownAggregateFunction(name) if name == "median"));
    }

    #[test]
    fn test_resolve_sum_requires_column() {
        let err = AggregateFunction::Sum.resolve("total", None).unwrap_err();
        assert!(matches!(err, Error::MissingAggregateColumn(_)));
    }

    #[test]
    fn test_resolve_rejects_string_sum() {
        let err = AggregateFunction::Sum
            .resolve("total", Some((1, &DataType::Utf8, "name")))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedColumnType { .. }));
    }

    #[test]
    fn test_resolve_result_fields() {
        let factory = AggregateFunction::Count.resolve("n", None).unwrap();
        assert_eq!(factory.result_field().name(), "n");
        assert_eq!(factory.result_field().data_type(), &DataType::Int64);

        let factory = AggregateFunction::Avg
            .resolve("mean", Some((0, &DataType::Int64, "v")))
            .unwrap();
        assert_eq!(factory.result_field().data_type(), &DataType::Float64);
    }

    #[test]
    fn test_scalar_float_eq_by_bits() {
        assert_eq!(ScalarValue::Float64(1.5), ScalarValue::Float64(1.5));
        assert_ne!(ScalarValue::Float64(0.0), ScalarValue::Float64(-0.0));
        assert_eq!(
            ScalarValue::Float64(f64::NAN),
            ScalarValue::Float64(f64::NAN)
        );
    }

    #[test]
    fn test_scalar_null_and_types() {
        assert!(ScalarValue::Null.is_null());
        assert!(!ScalarValue::Int64(0).is_null());
        assert_eq!(ScalarValue::Int64(1).data_type(), DataType::Int64);
        assert_eq!(
            ScalarValue::Utf8("x".into()).data_type(),
            DataType::Utf8
        );
    }

    #[test]
    fn test_scalar_hash_matches_eq() {
        let a = ScalarValue::Utf8("alpha".into());
        let b = ScalarValue::Utf8("alpha".into());
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(ScalarValue::Int64(1), ScalarValue::Float64(1.0));
    }
}
