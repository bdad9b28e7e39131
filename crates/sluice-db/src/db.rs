//! The `SluiceDb` facade.
//!
//! Owns the table store, the view registry, and the clock, and wires the
//! insert path to view ingestion. Everything a view needs at runtime is
//! injected from here; there is no process-global state, so independent
//! instances coexist freely (one per test, typically).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parking_lot::RwLock;

use sluice_core::metrics::{FlushMetrics, LateDataMetrics};
use sluice_core::time::{Clock, SystemClock};

use crate::config::SluiceConfig;
use crate::error::DbError;
use crate::registry::{RegisteredView, ViewRegistry};
use crate::table_store::{schemas_compatible, TableStore};
use crate::view::{FireScheduler, ResolvedView, ViewDefinition, WindowView};

/// An embedded Sluice database instance.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use arrow::datatypes::{DataType, Field, Schema};
/// use sluice_db::{AggregateSpec, SluiceDb, ViewDefinition, WindowSpec};
///
/// # #[tokio::main] async fn main() -> Result<(), sluice_db::DbError> {
/// let db = SluiceDb::open();
/// db.create_table(
///     "mt",
///     Arc::new(Schema::new(vec![Field::new("ts", DataType::Int64, false)])),
/// )?;
/// db.create_window_view(
///     ViewDefinition::new("wv", "mt", "dst", WindowSpec::tumbling(Duration::from_secs(1), "ts"))
///         .aggregate(AggregateSpec::count("count")),
/// )?;
/// // INSERT INTO mt ... ; results land in dst once each window elapses.
/// # Ok(()) }
/// ```
pub struct SluiceDb {
    store: Arc<RwLock<TableStore>>,
    registry: ViewRegistry,
    clock: Arc<dyn Clock>,
    config: SluiceConfig,
    shutdown: AtomicBool,
}

impl SluiceDb {
    /// Opens an instance with default config and the system clock.
    ///
    /// Must be called within a tokio runtime; view fire schedulers spawn
    /// onto it.
    #[must_use]
    pub fn open() -> Self {
        Self::builder().open()
    }

    /// Returns a builder for customizing config and clock.
    #[must_use]
    pub fn builder() -> SluiceDbBuilder {
        SluiceDbBuilder::new()
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableAlreadyExists`] on a name collision and
    /// [`DbError::Shutdown`] after shutdown.
    pub fn create_table(&self, name: &str, schema: SchemaRef) -> Result<(), DbError> {
        self.ensure_open()?;
        self.store.write().create_table(name, schema)?;
        tracing::info!(table = name, "table created");
        Ok(())
    }

    /// Drops a table. If `name` is a window view, deregisters the
    /// view, cancelling its scheduler and discarding unflushed state.
    ///
    /// The view's destination table is left in place; already-flushed
    /// results remain readable.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableInUse`] when the table is the source of a
    /// live view, [`DbError::TableNotFound`] when nothing has the name.
    pub async fn drop_table(&self, name: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        if self.registry.contains(name) {
            return self.drop_view(name).await;
        }
        if let Some(view) = self.registry.watcher_name(name) {
            return Err(DbError::TableInUse {
                table: name.to_string(),
                view,
            });
        }
        self.store.write().drop_table(name)?;
        tracing::info!(table = name, "table dropped");
        Ok(())
    }

    /// Registers a window view and arms its fire scheduler.
    ///
    /// Validates the window spec, resolves aggregates and GROUP BY columns
    /// against the source schema, and creates the destination table when
    /// absent (checking compatibility when present). All rejections happen
    /// here, before any state exists.
    ///
    /// # Errors
    ///
    /// Core validation errors ([`DbError::Core`]),
    /// [`DbError::TableNotFound`] for a missing source,
    /// [`DbError::ViewAlreadyExists`] / [`DbError::TableAlreadyExists`]
    /// for name collisions, [`DbError::SchemaMismatch`] for an
    /// incompatible pre-existing destination.
    pub fn create_window_view(&self, definition: ViewDefinition) -> Result<(), DbError> {
        self.ensure_open()?;
        let name = definition.name.clone();
        if self.registry.contains(&name) {
            return Err(DbError::ViewAlreadyExists(name));
        }

        let source_schema = {
            let store = self.store.read();
            if store.has_table(&name) {
                // The view occupies the table namespace: DROP TABLE targets it.
                return Err(DbError::TableAlreadyExists(name));
            }
            store
                .schema(&definition.source)
                .ok_or_else(|| DbError::TableNotFound(definition.source.clone()))?
        };

        let resolved =
            ResolvedView::resolve(definition, &source_schema, self.config.default_fire_policy)?;

        {
            let mut store = self.store.write();
            match store.schema(&resolved.definition.destination) {
                None => {
                    store.create_table(
                        &resolved.definition.destination,
                        Arc::clone(&resolved.output_schema),
                    )?;
                }
                Some(existing) => {
                    if !schemas_compatible(&resolved.output_schema, &existing) {
                        return Err(DbError::SchemaMismatch(format!(
                            "destination '{}' exists with an incompatible schema",
                            resolved.definition.destination
                        )));
                    }
                }
            }
        }

        let hop_ms = u64::try_from(resolved.definition.window.hop_ms).unwrap_or(0);
        let poll = self
            .config
            .poll_interval_for_hop(Duration::from_millis(hop_ms));

        let view = Arc::new(WindowView::new(resolved, Arc::clone(&self.clock))?);
        let scheduler = FireScheduler::spawn(Arc::clone(&view), Arc::clone(&self.store), poll);
        let registered = Arc::new(RegisteredView { view, scheduler });

        if let Err(e) = self.registry.insert(Arc::clone(&registered)) {
            // Lost a race with a concurrent create; wind the task down.
            registered.scheduler.request_stop();
            return Err(e);
        }
        tracing::info!(
            view = %registered.view.name(),
            source = %registered.view.source(),
            destination = %registered.view.destination(),
            "window view created"
        );
        Ok(())
    }

    /// Deregisters a window view: stops its scheduler, waits (bounded) for
    /// an in-flight fire tick, and discards unflushed window state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ViewNotFound`] if no such view exists.
    pub async fn drop_view(&self, name: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        let registered = self
            .registry
            .remove(name)
            .ok_or_else(|| DbError::ViewNotFound(name.to_string()))?;
        registered.scheduler.cancel(self.config.drop_timeout).await;
        registered.view.discard_state();
        tracing::info!(view = name, "window view dropped");
        Ok(())
    }

    /// Appends a batch to a table and synchronously routes it through
    /// every view watching that table.
    ///
    /// Returns the number of rows inserted. Late rows never fail the
    /// insert; they are dropped inside the view and counted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableNotFound`] or [`DbError::SchemaMismatch`]
    /// from the table append.
    pub fn insert(&self, table: &str, batch: RecordBatch) -> Result<usize, DbError> {
        self.ensure_open()?;
        let rows = self.store.write().append(table, batch.clone())?;
        for watcher in self.registry.watchers_of(table) {
            watcher.view.ingest(&batch);
        }
        Ok(rows)
    }

    /// Reads all batches of a table (destinations are ordinary tables).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TableNotFound`] if the table does not exist.
    pub fn scan(&self, table: &str) -> Result<Vec<RecordBatch>, DbError> {
        self.ensure_open()?;
        self.store.read().scan(table)
    }

    /// Runs one synchronous fire tick for a view, exactly what its
    /// scheduler does per poll. Lets tests and embedders drive firing
    /// deterministically with a virtual clock.
    ///
    /// Returns the number of windows flushed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ViewNotFound`] if no such view exists.
    pub fn pump_view(&self, name: &str) -> Result<usize, DbError> {
        self.ensure_open()?;
        let registered = self
            .registry
            .get(name)
            .ok_or_else(|| DbError::ViewNotFound(name.to_string()))?;
        let boundary = registered.view.fire_boundary();
        Ok(registered.view.fire_due(boundary, &self.store))
    }

    /// Introspection snapshot of one view.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ViewNotFound`] if no such view exists.
    pub fn view_info(&self, name: &str) -> Result<ViewInfo, DbError> {
        let registered = self
            .registry
            .get(name)
            .ok_or_else(|| DbError::ViewNotFound(name.to_string()))?;
        let view = &registered.view;
        Ok(ViewInfo {
            name: view.name().to_string(),
            source: view.source().to_string(),
            destination: view.destination().to_string(),
            watermark: view.watermark(),
            open_windows: view.open_windows(),
            late: view.late_metrics(),
            flush: view.flush_metrics(),
        })
    }

    /// Names of all tables, sorted.
    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        let mut names = self.store.read().table_names();
        names.sort();
        names
    }

    /// Names of all window views, sorted.
    #[must_use]
    pub fn list_views(&self) -> Vec<String> {
        let mut names = self.registry.names();
        names.sort();
        names
    }

    /// Shuts the instance down: cancels every view scheduler (waiting out
    /// in-flight ticks) and discards unflushed window state. Idempotent.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps room for flush-on-close.
    pub async fn shutdown(&self) -> Result<(), DbError> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for registered in self.registry.drain() {
            registered.scheduler.cancel(self.config.drop_timeout).await;
            registered.view.discard_state();
        }
        tracing::info!("sluice database shut down");
        Ok(())
    }

    /// True once `shutdown` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::Shutdown);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SluiceDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SluiceDb")
            .field("tables", &self.store.read().table_names().len())
            .field("views", &self.registry.names().len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SluiceDb`] instances.
pub struct SluiceDbBuilder {
    config: SluiceConfig,
    clock: Arc<dyn Clock>,
}

impl SluiceDbBuilder {
    /// Starts from defaults: [`SluiceConfig::default`] and the system
    /// clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SluiceConfig::default(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Overrides the configuration.
    #[must_use]
    pub fn config(mut self, config: SluiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Injects a clock (a `VirtualClock` in tests).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the instance.
    #[must_use]
    pub fn open(self) -> SluiceDb {
        SluiceDb {
            store: Arc::new(RwLock::new(TableStore::new())),
            registry: ViewRegistry::new(),
            clock: self.clock,
            config: self.config,
            shutdown: AtomicBool::new(false),
        }
    }
}

impl Default for SluiceDbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Introspection snapshot of a registered view.
#[derive(Debug, Clone)]
pub struct ViewInfo {
    /// View name.
    pub name: String,
    /// Source table.
    pub source: String,
    /// Destination table.
    pub destination: String,
    /// Current event-time watermark, if any row has been seen.
    pub watermark: Option<i64>,
    /// Windows currently holding state.
    pub open_windows: usize,
    /// Late-data counters.
    pub late: LateDataMetrics,
    /// Flush counters.
    pub flush: FlushMetrics,
}
