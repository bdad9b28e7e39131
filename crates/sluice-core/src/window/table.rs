//! The window table: authoritative per-view map from open window to
//! partial aggregate state.
//!
//! Keyed two levels deep: window bounds, then GROUP BY key. A window
//! present in the table has never been finalized; firing *drains* the
//! whole window out of the map in the same step that decides it is due,
//! which is what makes a flush at-most-once under concurrent ticks. If the
//! downstream append then fails, the drained state is merged back and the
//! window fires again on a later tick.
//!
//! The table itself is not synchronized; the owning view wraps it in a
//! mutex shared by ingestion and the fire scheduler.

use fxhash::FxHashMap;
use smallvec::SmallVec;

use arrow_array::{ArrayRef, RecordBatch};

use crate::aggregate::{AggregateAccumulator, ScalarValue};
use crate::Result;

use super::WindowBounds;

/// A GROUP BY key: the tuple of key-column values of one row.
///
/// The empty tuple is the single global group of a view without GROUP BY.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupKey(SmallVec<[ScalarValue; 2]>);

impl GroupKey {
    /// The global (empty) group key.
    #[must_use]
    pub fn global() -> Self {
        Self(SmallVec::new())
    }

    /// Extracts the key for row `row` from the given key columns.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::Error::UnsupportedColumnType`] from value
    /// extraction; CREATE-time resolution makes this unreachable for
    /// registered views.
    pub fn extract(batch: &RecordBatch, key_columns: &[usize], row: usize) -> Result<Self> {
        let mut values = SmallVec::with_capacity(key_columns.len());
        for &col in key_columns {
            let column: &ArrayRef = batch.column(col);
            let name = batch.schema().field(col).name().clone();
            values.push(ScalarValue::from_array(column, row, &name)?);
        }
        Ok(Self(values))
    }

    /// The key's values, in GROUP BY order.
    #[must_use]
    pub fn values(&self) -> &[ScalarValue] {
        &self.0
    }
}

/// Partial aggregate state of one (window, group) pair.
pub struct WindowState {
    accumulators: Vec<Box<dyn AggregateAccumulator>>,
    row_count: u64,
    created_at: i64,
}

impl WindowState {
    /// Creates state with freshly-initialized accumulators.
    #[must_use]
    pub fn new(accumulators: Vec<Box<dyn AggregateAccumulator>>, created_at: i64) -> Self {
        Self {
            accumulators,
            row_count: 0,
            created_at,
        }
    }

    /// Folds row `row` of `batch` into every accumulator.
    pub fn update(&mut self, batch: &RecordBatch, row: usize) {
        for acc in &mut self.accumulators {
            acc.update(batch, row);
        }
        self.row_count += 1;
    }

    /// Merges `other` into this state, accumulator by accumulator.
    pub fn merge(&mut self, other: &Self) {
        for (acc, other_acc) in self.accumulators.iter_mut().zip(&other.accumulators) {
            acc.merge(other_acc.as_ref());
        }
        self.row_count += other.row_count;
        self.created_at = self.created_at.min(other.created_at);
    }

    /// Finalizes every accumulator, in aggregate-list order.
    #[must_use]
    pub fn finalize(&self) -> Vec<ScalarValue> {
        self.accumulators.iter().map(|a| a.finalize()).collect()
    }

    /// Number of rows folded into this state.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Processing-time timestamp at which the state was created.
    #[must_use]
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl std::fmt::Debug for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowState")
            .field("accumulators", &self.accumulators.len())
            .field("row_count", &self.row_count)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Per-group states of one window, drained together at fire time.
pub type WindowGroups = FxHashMap<GroupKey, WindowState>;

/// Map from open window to its per-group aggregate state.
#[derive(Debug, Default)]
pub struct WindowTable {
    windows: FxHashMap<WindowBounds, WindowGroups>,
}

impl WindowTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state for `(bounds, group)`, creating it with `init` on
    /// first sight.
    pub fn state_mut(
        &mut self,
        bounds: WindowBounds,
        group: &GroupKey,
        init: impl FnOnce() -> WindowState,
    ) -> &mut WindowState {
        self.windows
            .entry(bounds)
            .or_default()
            .entry(group.clone())
            .or_insert_with(init)
    }

    /// Windows whose end is at or before `boundary`, in ascending end
    /// order. A snapshot of the map at call time.
    #[must_use]
    pub fn windows_ending_before(&self, boundary: i64) -> Vec<WindowBounds> {
        let mut due: Vec<WindowBounds> = self
            .windows
            .keys()
            .filter(|w| w.end <= boundary)
            .copied()
            .collect();
        due.sort_unstable_by_key(|w| (w.end, w.start));
        due
    }

    /// Removes and returns every window due at `boundary`.
    ///
    /// Fireability is decided and the state detached in one step; callers
    /// hold the view mutex across the call, so a window can be drained at
    /// most once.
    #[must_use]
    pub fn drain_ending_before(&mut self, boundary: i64) -> Vec<(WindowBounds, WindowGroups)> {
        self.windows_ending_before(boundary)
            .into_iter()
            .filter_map(|bounds| self.windows.remove(&bounds).map(|groups| (bounds, groups)))
            .collect()
    }

    /// Removes one window's state, if present.
    pub fn remove_window(&mut self, bounds: WindowBounds) -> Option<WindowGroups> {
        self.windows.remove(&bounds)
    }

    /// Reinstates drained state after a failed flush.
    ///
    /// Any state a racing insert created for the same (window, group) while
    /// the flush was in flight absorbs the drained accumulators via
    /// `merge`.
    pub fn merge_back(&mut self, bounds: WindowBounds, groups: WindowGroups) {
        let existing = self.windows.entry(bounds).or_default();
        for (group, state) in groups {
            match existing.entry(group) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    slot.get_mut().merge(&state);
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(state);
                }
            }
        }
    }

    /// Number of open windows.
    #[must_use]
    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }

    /// True when no window is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Discards all state (view DROP).
    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CountAccumulator;
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};
    use std::sync::Arc;

    fn count_state() -> WindowState {
        WindowState::new(vec![Box::new(CountAccumulator::new(None))], 0)
    }

    fn one_row_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap()
    }

    #[test]
    fn test_state_created_on_first_sight() {
        let mut table = WindowTable::new();
        let bounds = WindowBounds::new(0, 1000);
        assert!(table.is_empty());

        let state = table.state_mut(bounds, &GroupKey::global(), count_state);
        state.update(&one_row_batch(), 0);
        assert_eq!(table.open_window_count(), 1);

        // Second lookup reuses the same state.
        let state = table.state_mut(bounds, &GroupKey::global(), count_state);
        assert_eq!(state.row_count(), 1);
    }

    #[test]
    fn test_windows_ending_before_is_sorted_snapshot() {
        let mut table = WindowTable::new();
        for start in [2000, 0, 1000] {
            let _ = table.state_mut(
                WindowBounds::new(start, start + 1000),
                &GroupKey::global(),
                count_state,
            );
        }
        let due = table.windows_ending_before(2000);
        assert_eq!(
            due,
            vec![WindowBounds::new(0, 1000), WindowBounds::new(1000, 2000)]
        );
        // Snapshot only; nothing removed.
        assert_eq!(table.open_window_count(), 3);
    }

    #[test]
    fn test_drain_removes_due_windows_once() {
        let mut table = WindowTable::new();
        let bounds = WindowBounds::new(0, 1000);
        table
            .state_mut(bounds, &GroupKey::global(), count_state)
            .update(&one_row_batch(), 0);

        let drained = table.drain_ending_before(1000);
        assert_eq!(drained.len(), 1);
        assert!(table.is_empty());

        // A second drain at the same boundary finds nothing.
        assert!(table.drain_ending_before(1000).is_empty());
    }

    #[test]
    fn test_boundary_is_exclusive_for_open_windows() {
        let mut table = WindowTable::new();
        let _ = table.state_mut(WindowBounds::new(0, 1000), &GroupKey::global(), count_state);
        // A window ending after the boundary stays open.
        assert!(table.drain_ending_before(999).is_empty());
        assert_eq!(table.drain_ending_before(1000).len(), 1);
    }

    #[test]
    fn test_merge_back_combines_with_fresh_state() {
        let mut table = WindowTable::new();
        let bounds = WindowBounds::new(0, 1000);
        let batch = one_row_batch();

        table
            .state_mut(bounds, &GroupKey::global(), count_state)
            .update(&batch, 0);
        let drained = table.drain_ending_before(1000);

        // A racing insert recreates the window while the flush is in flight.
        table
            .state_mut(bounds, &GroupKey::global(), count_state)
            .update(&batch, 0);

        // Flush fails; drained state merges back over the fresh state.
        for (bounds, groups) in drained {
            table.merge_back(bounds, groups);
        }
        let state = table.state_mut(bounds, &GroupKey::global(), count_state);
        assert_eq!(state.row_count(), 2);
    }

    #[test]
    fn test_remove_window() {
        let mut table = WindowTable::new();
        let bounds = WindowBounds::new(0, 1000);
        let _ = table.state_mut(bounds, &GroupKey::global(), count_state);
        let groups = table.remove_window(bounds).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(table.remove_window(bounds).is_none());
    }

    #[test]
    fn test_merge_keeps_earliest_created_at() {
        let batch = one_row_batch();
        let mut early = WindowState::new(vec![Box::new(CountAccumulator::new(None))], 100);
        let mut late = WindowState::new(vec![Box::new(CountAccumulator::new(None))], 900);
        early.update(&batch, 0);
        late.update(&batch, 0);
        late.merge(&early);
        assert_eq!(late.created_at(), 100);
        assert_eq!(late.row_count(), 2);
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut table = WindowTable::new();
        let _ = table.state_mut(WindowBounds::new(0, 1000), &GroupKey::global(), count_state);
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_group_keys_isolate_state() {
        let mut table = WindowTable::new();
        let bounds = WindowBounds::new(0, 1000);
        let batch = one_row_batch();

        let a = GroupKey::extract(&batch, &[0], 0).unwrap();
        table.state_mut(bounds, &a, count_state).update(&batch, 0);
        table
            .state_mut(bounds, &GroupKey::global(), count_state)
            .update(&batch, 0);

        let drained = table.drain_ending_before(1000);
        assert_eq!(drained[0].1.len(), 2);
    }
}
