//! Window view runtime: ingestion and flushing.
//!
//! A registered view owns the mutable half of the pipeline: the window
//! table with all open-window aggregate state, the event-time watermark,
//! and the late/flush counters. Two callers touch it concurrently: the
//! ingest path, invoked synchronously for every batch inserted into the
//! source table, and the fire scheduler's periodic tick. One mutex over
//! the window table (plus metrics) keeps them correct; see `fire_due` for
//! the at-most-once argument.

mod definition;
mod scheduler;

pub use definition::{AggregateSpec, FirePolicy, ViewDefinition};
pub(crate) use definition::ResolvedView;
pub(crate) use scheduler::FireScheduler;

use std::sync::Arc;

use arrow::array::cast::AsArray;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Int64Type, TimestampMillisecondType};
use parking_lot::{Mutex, RwLock};

use sluice_core::aggregate::ScalarValue;
use sluice_core::metrics::{FlushMetrics, LateDataMetrics};
use sluice_core::time::{Clock, WatermarkTracker};
use sluice_core::window::table::WindowGroups;
use sluice_core::window::{GroupKey, HopWindowAssigner, WindowBounds, WindowState, WindowTable};

use crate::error::DbError;
use crate::table_store::TableStore;

/// State shared between ingestion and the fire scheduler, guarded by one
/// mutex.
struct ViewInner {
    table: WindowTable,
    late: LateDataMetrics,
    flush: FlushMetrics,
}

/// The runtime of one registered window view.
pub(crate) struct WindowView {
    resolved: ResolvedView,
    assigner: HopWindowAssigner,
    watermark: WatermarkTracker,
    inner: Mutex<ViewInner>,
    clock: Arc<dyn Clock>,
}

impl WindowView {
    /// Builds the runtime from a resolved definition.
    pub(crate) fn new(resolved: ResolvedView, clock: Arc<dyn Clock>) -> Result<Self, DbError> {
        let assigner = HopWindowAssigner::for_spec(&resolved.definition.window)?;
        Ok(Self {
            resolved,
            assigner,
            watermark: WatermarkTracker::new(),
            inner: Mutex::new(ViewInner {
                table: WindowTable::new(),
                late: LateDataMetrics::new(),
                flush: FlushMetrics::new(),
            }),
            clock,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.resolved.definition.name
    }

    pub(crate) fn source(&self) -> &str {
        &self.resolved.definition.source
    }

    pub(crate) fn destination(&self) -> &str {
        &self.resolved.definition.destination
    }

    /// Current watermark timestamp, if any row has been seen.
    pub(crate) fn watermark(&self) -> Option<i64> {
        self.watermark.current().map(|w| w.timestamp())
    }

    pub(crate) fn open_windows(&self) -> usize {
        self.inner.lock().table.open_window_count()
    }

    pub(crate) fn late_metrics(&self) -> LateDataMetrics {
        self.inner.lock().late.clone()
    }

    pub(crate) fn flush_metrics(&self) -> FlushMetrics {
        self.inner.lock().flush.clone()
    }

    /// The boundary below which windows are considered closed right now.
    pub(crate) fn fire_boundary(&self) -> i64 {
        match self.resolved.fire {
            FirePolicy::ProcessingTime => self.clock.now_ms(),
            FirePolicy::EventTime { allowed_lateness } => {
                let lateness_ms = i64::try_from(allowed_lateness.as_millis()).unwrap_or(i64::MAX);
                match self.watermark.current() {
                    Some(wm) => wm.timestamp().saturating_sub(lateness_ms),
                    None => i64::MIN,
                }
            }
        }
    }

    /// Routes one inserted batch through the view, row by row.
    ///
    /// Never fails toward the inserting caller: rows without a usable
    /// event time are skipped, late rows are dropped and counted.
    pub(crate) fn ingest(&self, batch: &RecordBatch) {
        let mut inner = self.inner.lock();
        for row in 0..batch.num_rows() {
            let Some(ts) = event_time_at(batch, self.resolved.time_column, row) else {
                tracing::debug!(view = %self.name(), row, "row without event time skipped");
                continue;
            };
            self.watermark.observe(ts);

            let boundary = self.fire_boundary();
            if self.assigner.latest_end(ts) <= boundary {
                inner.late.record_dropped(ts);
                tracing::debug!(
                    view = %self.name(),
                    event_time = ts,
                    boundary,
                    "late row dropped"
                );
                continue;
            }

            let group = match GroupKey::extract(batch, &self.resolved.group_columns, row) {
                Ok(group) => group,
                Err(error) => {
                    tracing::warn!(view = %self.name(), row, %error, "group key extraction failed");
                    continue;
                }
            };

            let created_at = self.clock.now_ms();
            let factories = &self.resolved.factories;
            for bounds in self.assigner.assign(ts) {
                // Windows this row maps to that have already fired stay
                // closed; only still-open windows accept it.
                if bounds.end <= boundary {
                    continue;
                }
                inner
                    .table
                    .state_mut(bounds, &group, || {
                        WindowState::new(factories.iter().map(|f| f.create()).collect(), created_at)
                    })
                    .update(batch, row);
            }
        }
    }

    /// Fires every window due at `boundary`: finalize, append to the
    /// destination, and only then let go of the state.
    ///
    /// Returns the number of windows flushed. The drain happens under the
    /// same lock that decides fireability, so concurrent ticks cannot
    /// flush a window twice; a failed append merges the drained state back
    /// and the window retries on a later tick.
    pub(crate) fn fire_due(&self, boundary: i64, store: &RwLock<TableStore>) -> usize {
        let due = { self.inner.lock().table.drain_ending_before(boundary) };
        if due.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        for (bounds, groups) in due {
            match self.flush_window(bounds, &groups, store) {
                Ok(rows) => {
                    flushed += 1;
                    tracing::debug!(
                        view = %self.name(),
                        window_start = bounds.start,
                        window_end = bounds.end,
                        rows,
                        "window flushed"
                    );
                    let mut inner = self.inner.lock();
                    inner.flush.record_flush(rows, bounds.end, self.clock.now_ms());
                }
                Err(error) => {
                    tracing::warn!(
                        view = %self.name(),
                        window_start = bounds.start,
                        window_end = bounds.end,
                        %error,
                        "destination append failed, window retained for retry"
                    );
                    let mut inner = self.inner.lock();
                    inner.table.merge_back(bounds, groups);
                    inner.flush.record_failure();
                }
            }
        }
        flushed
    }

    /// Discards all open-window state (view DROP).
    pub(crate) fn discard_state(&self) {
        let mut inner = self.inner.lock();
        let open = inner.table.open_window_count();
        if open > 0 {
            tracing::info!(view = %self.name(), open_windows = open, "discarding unflushed window state");
        }
        inner.table.clear();
    }

    /// Builds the result batch for one fired window and appends it.
    fn flush_window(
        &self,
        bounds: WindowBounds,
        groups: &WindowGroups,
        store: &RwLock<TableStore>,
    ) -> Result<u64, DbError> {
        let batch = self.result_batch(bounds, groups)?;
        let rows = batch.num_rows();
        store
            .write()
            .append(self.destination(), batch)
            .map_err(|e| DbError::DestinationWrite(e.to_string()))?;
        Ok(rows as u64)
    }

    /// One output row per group key present in the window.
    fn result_batch(
        &self,
        bounds: WindowBounds,
        groups: &WindowGroups,
    ) -> Result<RecordBatch, DbError> {
        let rows = groups.len();
        let mut starts = Vec::with_capacity(rows);
        let mut ends = Vec::with_capacity(rows);
        let mut group_cols: Vec<Vec<ScalarValue>> =
            vec![Vec::with_capacity(rows); self.resolved.group_columns.len()];
        let mut agg_cols: Vec<Vec<ScalarValue>> =
            vec![Vec::with_capacity(rows); self.resolved.factories.len()];

        for (group, state) in groups {
            starts.push(bounds.start);
            ends.push(bounds.end);
            for (i, value) in group.values().iter().enumerate() {
                group_cols[i].push(value.clone());
            }
            for (i, value) in state.finalize().into_iter().enumerate() {
                agg_cols[i].push(value);
            }
        }

        let schema = &self.resolved.output_schema;
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        columns.push(Arc::new(Int64Array::from(starts)));
        columns.push(Arc::new(Int64Array::from(ends)));
        for (i, values) in group_cols.into_iter().enumerate() {
            columns.push(column_from_scalars(values, schema.field(2 + i))?);
        }
        let agg_offset = 2 + self.resolved.group_columns.len();
        for (i, values) in agg_cols.into_iter().enumerate() {
            columns.push(column_from_scalars(values, schema.field(agg_offset + i))?);
        }

        Ok(RecordBatch::try_new(Arc::clone(schema), columns)?)
    }
}

/// Event time of row `row`, from an Int64 or millisecond-timestamp column.
fn event_time_at(batch: &RecordBatch, column: usize, row: usize) -> Option<i64> {
    let array = batch.column(column);
    if array.is_null(row) {
        return None;
    }
    if let Some(ints) = array.as_primitive_opt::<Int64Type>() {
        return Some(ints.value(row));
    }
    array
        .as_primitive_opt::<TimestampMillisecondType>()
        .map(|ts| ts.value(row))
}

/// Materializes scalar values as an Arrow array of the field's type.
fn column_from_scalars(values: Vec<ScalarValue>, field: &Field) -> Result<ArrayRef, DbError> {
    let array: ArrayRef = match field.data_type() {
        DataType::Int64 => Arc::new(Int64Array::from(
            values
                .into_iter()
                .map(|v| match v {
                    ScalarValue::Int64(i) => Some(i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values
                .into_iter()
                .map(|v| match v {
                    ScalarValue::Float64(f) => Some(f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Utf8 => Arc::new(StringArray::from(
            values
                .into_iter()
                .map(|v| match v {
                    ScalarValue::Utf8(s) => Some(s),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            values
                .into_iter()
                .map(|v| match v {
                    ScalarValue::Boolean(b) => Some(b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        other => {
            return Err(DbError::SchemaMismatch(format!(
                "cannot materialize column '{}' of type {other}",
                field.name()
            )))
        }
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Schema, SchemaRef};
    use sluice_core::time::VirtualClock;
    use sluice_core::window::WindowSpec;
    use std::time::Duration;

    fn source_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("user", DataType::Utf8, false),
            Field::new("amount", DataType::Int64, true),
        ]))
    }

    fn source_batch(rows: &[(i64, &str, i64)]) -> RecordBatch {
        RecordBatch::try_new(
            source_schema(),
            vec![
                Arc::new(Int64Array::from(
                    rows.iter().map(|r| r.0).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r.1).collect::<Vec<_>>(),
                )),
                Arc::new(Int64Array::from(
                    rows.iter().map(|r| r.2).collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    }

    fn test_view(clock: Arc<VirtualClock>) -> (WindowView, RwLock<TableStore>) {
        let definition = ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::tumbling(Duration::from_secs(1), "ts"),
        )
        .group_by("user")
        .aggregate(AggregateSpec::count("n"))
        .aggregate(AggregateSpec::sum("amount", "total"));

        let resolved =
            ResolvedView::resolve(definition, &source_schema(), FirePolicy::ProcessingTime)
                .unwrap();
        let mut store = TableStore::new();
        store
            .create_table("dst", Arc::clone(&resolved.output_schema))
            .unwrap();
        (
            WindowView::new(resolved, clock).unwrap(),
            RwLock::new(store),
        )
    }

    #[test]
    fn test_ingest_then_fire_emits_counts() {
        let clock = Arc::new(VirtualClock::new(10_000));
        let (view, store) = test_view(Arc::clone(&clock));

        view.ingest(&source_batch(&[
            (10_100, "a", 5),
            (10_200, "a", 7),
            (10_300, "b", 1),
        ]));
        assert_eq!(view.open_windows(), 1);

        // Window [10000, 11000) still open.
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 0);

        clock.advance(Duration::from_secs(2));
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 1);
        assert_eq!(view.open_windows(), 0);

        let batches = store.read().scan("dst").unwrap();
        let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(total_rows, 2); // one row per group

        let metrics = view.flush_metrics();
        assert_eq!(metrics.windows_flushed(), 1);
        assert_eq!(metrics.rows_emitted(), 2);
    }

    #[test]
    fn test_fire_is_at_most_once_per_window() {
        let clock = Arc::new(VirtualClock::new(10_000));
        let (view, store) = test_view(Arc::clone(&clock));

        view.ingest(&source_batch(&[(10_100, "a", 5)]));
        clock.advance(Duration::from_secs(2));

        let boundary = view.fire_boundary();
        assert_eq!(view.fire_due(boundary, &store), 1);
        // Same boundary again: the window is gone, nothing fires.
        assert_eq!(view.fire_due(boundary, &store), 0);
        assert_eq!(store.read().row_count("dst"), Some(1));
    }

    #[test]
    fn test_late_row_dropped_after_flush() {
        let clock = Arc::new(VirtualClock::new(10_000));
        let (view, store) = test_view(Arc::clone(&clock));

        view.ingest(&source_batch(&[(10_100, "a", 5)]));
        clock.advance(Duration::from_secs(2));
        view.fire_due(view.fire_boundary(), &store);

        // Event time in the already-flushed window.
        view.ingest(&source_batch(&[(10_200, "a", 9)]));
        assert_eq!(view.late_metrics().rows_dropped(), 1);
        assert_eq!(view.open_windows(), 0);

        // Nothing new fires and the flushed result is untouched.
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 0);
        assert_eq!(store.read().row_count("dst"), Some(1));
    }

    #[test]
    fn test_failed_flush_retries_with_state_intact() {
        let clock = Arc::new(VirtualClock::new(10_000));
        let (view, store) = test_view(Arc::clone(&clock));

        view.ingest(&source_batch(&[(10_100, "a", 5), (10_200, "a", 7)]));
        clock.advance(Duration::from_secs(2));

        // Destination vanishes: flush fails, state is retained.
        let schema = store.read().schema("dst").unwrap();
        store.write().drop_table("dst").unwrap();
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 0);
        assert_eq!(view.open_windows(), 1);
        assert_eq!(view.flush_metrics().flush_failures(), 1);

        // Destination restored: the next tick flushes the same window once,
        // with the full pre-failure state.
        store.write().create_table("dst", schema).unwrap();
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 1);
        let batches = store.read().scan("dst").unwrap();
        let n = batches[0]
            .column(3)
            .as_primitive_opt::<Int64Type>()
            .unwrap()
            .value(0);
        assert_eq!(n, 2);
    }

    #[test]
    fn test_event_time_policy_waits_for_watermark() {
        let clock = Arc::new(VirtualClock::new(10_000));
        let definition = ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::tumbling(Duration::from_secs(1), "ts"),
        )
        .aggregate(AggregateSpec::count("n"))
        .fire_policy(FirePolicy::event_time());

        let resolved =
            ResolvedView::resolve(definition, &source_schema(), FirePolicy::ProcessingTime)
                .unwrap();
        let mut store = TableStore::new();
        store
            .create_table("dst", Arc::clone(&resolved.output_schema))
            .unwrap();
        let store = RwLock::new(store);
        let view = WindowView::new(resolved, clock).unwrap();

        view.ingest(&source_batch(&[(10_100, "a", 5)]));
        // Watermark at 10100: window [10000, 11000) is still open no matter
        // how much processing time passes.
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 0);

        // A row at 11000 pushes the watermark past the window end.
        view.ingest(&source_batch(&[(11_000, "a", 1)]));
        assert_eq!(view.fire_due(view.fire_boundary(), &store), 1);
        assert_eq!(store.read().row_count("dst"), Some(1));
    }
}
