//! Embedded database facade for Sluice window views.
//!
//! Ties the windowed streaming-aggregation engine (`sluice-core`) to a
//! minimal append-only table store: create tables, register window views
//! over them, insert rows, and read fired window results out of ordinary
//! destination tables.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_db::{AggregateSpec, SluiceDb, ViewDefinition, WindowSpec};
//!
//! let db = SluiceDb::open();
//! db.create_table("mt", schema)?;
//! db.create_window_view(
//!     ViewDefinition::new("wv", "mt", "dst",
//!         WindowSpec::tumbling(Duration::from_secs(1), "timestamp"))
//!         .aggregate(AggregateSpec::count("count")),
//! )?;
//! db.insert("mt", batch)?;
//! // ...after the window elapses, its scheduler fires:
//! let results = db.scan("dst")?;
//! ```
//!
//! SQL parsing and planning live outside this crate: [`ViewDefinition`]
//! is the post-parse shape of `CREATE WINDOW VIEW ... TO dst AS SELECT
//! ... FROM src GROUP BY HOP(...)`, and `drop_table` handles
//! `DROP TABLE <view_name>`.
//!
//! All state is in-memory. An unclean restart loses open (not-yet-fired)
//! window state; everything already flushed to a destination table is
//! whatever the embedding application made of it.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod db;
mod error;
mod registry;
mod table_store;
mod view;

pub use config::SluiceConfig;
pub use db::{SluiceDb, SluiceDbBuilder, ViewInfo};
pub use error::DbError;
pub use view::{AggregateSpec, FirePolicy, ViewDefinition};

// Re-export the core types a caller needs to define and observe views.
pub use sluice_core::aggregate::AggregateFunction;
pub use sluice_core::metrics::{FlushMetrics, LateDataMetrics};
pub use sluice_core::time::{Clock, SystemClock, VirtualClock};
pub use sluice_core::window::WindowSpec;
