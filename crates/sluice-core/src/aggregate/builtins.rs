//! Built-in accumulators: COUNT, SUM, MIN, MAX, AVG over Int64/Float64.

use std::any::Any;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, Int64Type};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{DataType, Field};

use super::{AggregateAccumulator, AggregateFactory, ScalarValue};

#[inline]
fn int64_at(batch: &RecordBatch, column: usize, row: usize) -> Option<i64> {
    if column >= batch.num_columns() {
        return None;
    }
    let array = batch.column(column).as_primitive_opt::<Int64Type>()?;
    (!array.is_null(row)).then(|| array.value(row))
}

#[inline]
fn float64_at(batch: &RecordBatch, column: usize, row: usize) -> Option<f64> {
    if column >= batch.num_columns() {
        return None;
    }
    let array = batch.column(column).as_primitive_opt::<Float64Type>()?;
    (!array.is_null(row)).then(|| array.value(row))
}

// ── COUNT ───────────────────────────────────────────────────────────────────

/// Accumulator for `COUNT(*)` / `COUNT(col)`.
#[derive(Debug, Clone, Default)]
pub struct CountAccumulator {
    column: Option<usize>,
    count: u64,
}

impl CountAccumulator {
    /// Creates a count accumulator; `column` switches to non-null counting.
    #[must_use]
    pub fn new(column: Option<usize>) -> Self {
        Self { column, count: 0 }
    }
}

impl AggregateAccumulator for CountAccumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        match self.column {
            None => self.count += 1,
            Some(col) => {
                if col < batch.num_columns() && !batch.column(col).is_null(row) {
                    self.count += 1;
                }
            }
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.count += other.count;
        }
    }

    fn finalize(&self) -> ScalarValue {
        ScalarValue::Int64(i64::try_from(self.count).unwrap_or(i64::MAX))
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`CountAccumulator`].
#[derive(Debug, Clone)]
pub struct CountFactory {
    column: Option<usize>,
    alias: String,
}

impl CountFactory {
    /// Creates a COUNT factory.
    #[must_use]
    pub fn new(column: Option<usize>, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for CountFactory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(CountAccumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Int64, false)
    }
}

// ── SUM ─────────────────────────────────────────────────────────────────────

/// Accumulator for `SUM` over an Int64 column.
#[derive(Debug, Clone)]
pub struct SumInt64Accumulator {
    column: usize,
    sum: i64,
    count: u64,
}

impl SumInt64Accumulator {
    /// Creates a sum accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self {
            column,
            sum: 0,
            count: 0,
        }
    }
}

impl AggregateAccumulator for SumInt64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = int64_at(batch, self.column, row) {
            self.sum = self.sum.wrapping_add(value);
            self.count += 1;
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.sum = self.sum.wrapping_add(other.sum);
            self.count += other.count;
        }
    }

    fn finalize(&self) -> ScalarValue {
        if self.count == 0 {
            ScalarValue::Null
        } else {
            ScalarValue::Int64(self.sum)
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`SumInt64Accumulator`].
#[derive(Debug, Clone)]
pub struct SumInt64Factory {
    column: usize,
    alias: String,
}

impl SumInt64Factory {
    /// Creates an Int64 SUM factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for SumInt64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(SumInt64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Int64, true)
    }
}

/// Accumulator for `SUM` over a Float64 column.
#[derive(Debug, Clone)]
pub struct SumFloat64Accumulator {
    column: usize,
    sum: f64,
    count: u64,
}

impl SumFloat64Accumulator {
    /// Creates a sum accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self {
            column,
            sum: 0.0,
            count: 0,
        }
    }
}

impl AggregateAccumulator for SumFloat64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = float64_at(batch, self.column, row) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.sum += other.sum;
            self.count += other.count;
        }
    }

    fn finalize(&self) -> ScalarValue {
        if self.count == 0 {
            ScalarValue::Null
        } else {
            ScalarValue::Float64(self.sum)
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`SumFloat64Accumulator`].
#[derive(Debug, Clone)]
pub struct SumFloat64Factory {
    column: usize,
    alias: String,
}

impl SumFloat64Factory {
    /// Creates a Float64 SUM factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for SumFloat64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(SumFloat64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Float64, true)
    }
}

// ── MIN / MAX ───────────────────────────────────────────────────────────────

/// Accumulator for `MIN` over an Int64 column.
#[derive(Debug, Clone)]
pub struct MinInt64Accumulator {
    column: usize,
    min: Option<i64>,
}

impl MinInt64Accumulator {
    /// Creates a min accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self { column, min: None }
    }
}

impl AggregateAccumulator for MinInt64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = int64_at(batch, self.column, row) {
            self.min = Some(self.min.map_or(value, |m| m.min(value)));
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            if let Some(other_min) = other.min {
                self.min = Some(self.min.map_or(other_min, |m| m.min(other_min)));
            }
        }
    }

    fn finalize(&self) -> ScalarValue {
        self.min.map_or(ScalarValue::Null, ScalarValue::Int64)
    }

    fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`MinInt64Accumulator`].
#[derive(Debug, Clone)]
pub struct MinInt64Factory {
    column: usize,
    alias: String,
}

impl MinInt64Factory {
    /// Creates an Int64 MIN factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for MinInt64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(MinInt64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Int64, true)
    }
}

/// Accumulator for `MAX` over an Int64 column.
#[derive(Debug, Clone)]
pub struct MaxInt64Accumulator {
    column: usize,
    max: Option<i64>,
}

impl MaxInt64Accumulator {
    /// Creates a max accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self { column, max: None }
    }
}

impl AggregateAccumulator for MaxInt64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = int64_at(batch, self.column, row) {
            self.max = Some(self.max.map_or(value, |m| m.max(value)));
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            if let Some(other_max) = other.max {
                self.max = Some(self.max.map_or(other_max, |m| m.max(other_max)));
            }
        }
    }

    fn finalize(&self) -> ScalarValue {
        self.max.map_or(ScalarValue::Null, ScalarValue::Int64)
    }

    fn is_empty(&self) -> bool {
        self.max.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`MaxInt64Accumulator`].
#[derive(Debug, Clone)]
pub struct MaxInt64Factory {
    column: usize,
    alias: String,
}

impl MaxInt64Factory {
    /// Creates an Int64 MAX factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for MaxInt64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(MaxInt64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Int64, true)
    }
}

/// Accumulator for `MIN` over a Float64 column.
#[derive(Debug, Clone)]
pub struct MinFloat64Accumulator {
    column: usize,
    min: Option<f64>,
}

impl MinFloat64Accumulator {
    /// Creates a min accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self { column, min: None }
    }
}

impl AggregateAccumulator for MinFloat64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = float64_at(batch, self.column, row) {
            self.min = Some(self.min.map_or(value, |m| m.min(value)));
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            if let Some(other_min) = other.min {
                self.min = Some(self.min.map_or(other_min, |m| m.min(other_min)));
            }
        }
    }

    fn finalize(&self) -> ScalarValue {
        self.min.map_or(ScalarValue::Null, ScalarValue::Float64)
    }

    fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`MinFloat64Accumulator`].
#[derive(Debug, Clone)]
pub struct MinFloat64Factory {
    column: usize,
    alias: String,
}

impl MinFloat64Factory {
    /// Creates a Float64 MIN factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for MinFloat64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(MinFloat64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Float64, true)
    }
}

/// Accumulator for `MAX` over a Float64 column.
#[derive(Debug, Clone)]
pub struct MaxFloat64Accumulator {
    column: usize,
    max: Option<f64>,
}

impl MaxFloat64Accumulator {
    /// Creates a max accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self { column, max: None }
    }
}

impl AggregateAccumulator for MaxFloat64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = float64_at(batch, self.column, row) {
            self.max = Some(self.max.map_or(value, |m| m.max(value)));
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            if let Some(other_max) = other.max {
                self.max = Some(self.max.map_or(other_max, |m| m.max(other_max)));
            }
        }
    }

    fn finalize(&self) -> ScalarValue {
        self.max.map_or(ScalarValue::Null, ScalarValue::Float64)
    }

    fn is_empty(&self) -> bool {
        self.max.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`MaxFloat64Accumulator`].
#[derive(Debug, Clone)]
pub struct MaxFloat64Factory {
    column: usize,
    alias: String,
}

impl MaxFloat64Factory {
    /// Creates a Float64 MAX factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for MaxFloat64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(MaxFloat64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Float64, true)
    }
}

// ── AVG ─────────────────────────────────────────────────────────────────────

/// Accumulator for `AVG` over an Int64 column.
#[derive(Debug, Clone)]
pub struct AvgInt64Accumulator {
    column: usize,
    sum: i64,
    count: u64,
}

impl AvgInt64Accumulator {
    /// Creates an avg accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self {
            column,
            sum: 0,
            count: 0,
        }
    }
}

impl AggregateAccumulator for AvgInt64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = int64_at(batch, self.column, row) {
            self.sum = self.sum.wrapping_add(value);
            self.count += 1;
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.sum = self.sum.wrapping_add(other.sum);
            self.count += other.count;
        }
    }

    // Precision loss is acceptable for arithmetic mean
    #[allow(clippy::cast_precision_loss)]
    fn finalize(&self) -> ScalarValue {
        if self.count == 0 {
            ScalarValue::Null
        } else {
            ScalarValue::Float64(self.sum as f64 / self.count as f64)
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`AvgInt64Accumulator`].
#[derive(Debug, Clone)]
pub struct AvgInt64Factory {
    column: usize,
    alias: String,
}

impl AvgInt64Factory {
    /// Creates an Int64 AVG factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for AvgInt64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(AvgInt64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Float64, true)
    }
}

/// Accumulator for `AVG` over a Float64 column.
#[derive(Debug, Clone)]
pub struct AvgFloat64Accumulator {
    column: usize,
    sum: f64,
    count: u64,
}

impl AvgFloat64Accumulator {
    /// Creates an avg accumulator reading `column`.
    #[must_use]
    pub fn new(column: usize) -> Self {
        Self {
            column,
            sum: 0.0,
            count: 0,
        }
    }
}

impl AggregateAccumulator for AvgFloat64Accumulator {
    fn update(&mut self, batch: &RecordBatch, row: usize) {
        if let Some(value) = float64_at(batch, self.column, row) {
            self.sum += value;
            self.count += 1;
        }
    }

    fn merge(&mut self, other: &dyn AggregateAccumulator) {
        if let Some(other) = other.as_any().downcast_ref::<Self>() {
            self.sum += other.sum;
            self.count += other.count;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finalize(&self) -> ScalarValue {
        if self.count == 0 {
            ScalarValue::Null
        } else {
            ScalarValue::Float64(self.sum / self.count as f64)
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`AvgFloat64Accumulator`].
#[derive(Debug, Clone)]
pub struct AvgFloat64Factory {
    column: usize,
    alias: String,
}

impl AvgFloat64Factory {
    /// Creates a Float64 AVG factory.
    #[must_use]
    pub fn new(column: usize, alias: impl Into<String>) -> Self {
        Self {
            column,
            alias: alias.into(),
        }
    }
}

impl AggregateFactory for AvgFloat64Factory {
    fn create(&self) -> Box<dyn AggregateAccumulator> {
        Box::new(AvgFloat64Accumulator::new(self.column))
    }

    fn result_field(&self) -> Field {
        Field::new(&self.alias, DataType::Float64, true)
    }
}
