//! Per-view fire scheduler.
//!
//! Each registered view gets one background tokio task that wakes at the
//! view's poll interval, computes the current fire boundary, and flushes
//! every due window. The task is explicitly cancellable: DROP signals the
//! shutdown `Notify` and then awaits the join handle (bounded), so no tick
//! is left running when the view's state is discarded.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::table_store::TableStore;

use super::WindowView;

/// Handle to a view's background fire loop.
pub(crate) struct FireScheduler {
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FireScheduler {
    /// Spawns the fire loop for `view`. Must be called within a tokio
    /// runtime.
    pub(crate) fn spawn(
        view: Arc<WindowView>,
        store: Arc<RwLock<TableStore>>,
        poll_interval: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            tracing::info!(
                view = %view.name(),
                poll_ms = poll_interval.as_millis() as u64,
                "fire scheduler started"
            );
            loop {
                tokio::select! {
                    () = shutdown_signal.notified() => {
                        tracing::info!(view = %view.name(), "fire scheduler stopping");
                        break;
                    }
                    () = tokio::time::sleep(poll_interval) => {}
                }

                let boundary = view.fire_boundary();
                let flushed = view.fire_due(boundary, &store);
                if flushed > 0 {
                    tracing::debug!(view = %view.name(), flushed, boundary, "fire tick");
                }
            }
        });

        Self {
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signals the loop to stop without waiting. Used when registration
    /// loses a race and the task must wind down on its own.
    pub(crate) fn request_stop(&self) {
        self.shutdown.notify_one();
    }

    /// Stops the loop and waits (bounded) for an in-flight tick to finish.
    pub(crate) async fn cancel(&self, timeout: Duration) {
        self.shutdown.notify_one();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "fire scheduler task panicked during shutdown");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "fire scheduler shutdown timed out"
                    );
                }
            }
        }
    }
}
