//! # Sluice Core
//!
//! The windowed streaming-aggregation engine behind Sluice window views.
//!
//! A window view continuously aggregates rows from a source table over
//! hopping event-time windows and emits each window's final result exactly
//! once, after the window has elapsed. This crate provides the pieces that
//! make that work:
//!
//! - **Time**: injectable [`time::Clock`] (wall clock or virtual), the
//!   per-view [`time::WatermarkTracker`]
//! - **Windows**: [`window::WindowSpec`] validation and the pure
//!   [`window::HopWindowAssigner`], plus the [`window::WindowTable`]
//!   holding per-window partial aggregate state
//! - **Aggregates**: the [`aggregate::AggregateAccumulator`] capability
//!   interface with built-in COUNT/SUM/MIN/MAX/AVG implementations
//! - **Metrics**: late-data and flush counters
//!
//! Window state is purely in-memory: an unclean process restart loses
//! windows that have not yet fired. Results that already reached the
//! destination table are unaffected.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod metrics;
pub mod time;
pub mod window;

use arrow_schema::DataType;

/// Result type for sluice-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sluice-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Window spec rejected at CREATE time (bad hop/size relationship).
    #[error("invalid window spec: {0}")]
    InvalidWindowSpec(String),

    /// The view's query names an aggregate function we have no accumulator for.
    #[error("unknown aggregate function '{0}'")]
    UnknownAggregateFunction(String),

    /// An aggregate that needs a column argument was given none.
    #[error("aggregate {0} requires a column argument")]
    MissingAggregateColumn(String),

    /// A named column does not exist in the source schema.
    #[error("column '{0}' not found in source schema")]
    ColumnNotFound(String),

    /// A column exists but its type is not supported in this position.
    #[error("column '{column}' has unsupported type {data_type} for {position}")]
    UnsupportedColumnType {
        /// The offending column name.
        column: String,
        /// The column's Arrow data type.
        data_type: DataType,
        /// Where the column was used (time column, group key, aggregate input).
        position: &'static str,
    },
}
