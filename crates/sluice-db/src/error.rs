//! Error types for the `SluiceDb` facade.

/// Errors from database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Core engine error (window spec, aggregate resolution, ...)
    #[error("engine error: {0}")]
    Core(#[from] sluice_core::Error),

    /// Arrow error while building or validating batches
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Table not found
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Table already exists
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    /// View not found
    #[error("window view '{0}' not found")]
    ViewNotFound(String),

    /// View already exists
    #[error("window view '{0}' already exists")]
    ViewAlreadyExists(String),

    /// Table cannot be dropped while a view reads from it
    #[error("table '{table}' is the source of window view '{view}'")]
    TableInUse {
        /// The table being dropped.
        table: String,
        /// The view that watches it.
        view: String,
    },

    /// Inserted or destination batch does not match the table schema
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Appending flushed results to the destination table failed
    #[error("destination write failed: {0}")]
    DestinationWrite(String),

    /// Database is shut down
    #[error("database is shut down")]
    Shutdown,
}
