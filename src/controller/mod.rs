//! Low-level controller: pumps a list/watch source into a [`DeltaFifo`] and
//! pops delta histories into a user-supplied processor.
//!
//! The informer façade wires this up for the common cache-and-notify case;
//! build a [`Controller`] directly when you need your own processor.

mod reflector;

pub use reflector::*;

#[cfg(test)]
mod controller_test;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::DeltaFifo;
use crate::Deltas;
use crate::Object;
use crate::PopError;
use crate::ResourceMeta;
use crate::Result;

/// Floor between pop-loop restarts after a processor panic.
const PROCESS_LOOP_RETRY_FLOOR: Duration = Duration::from_secs(1);

/// Processes one popped delta history, oldest delta first.
pub type ProcessFunc<T> = Arc<dyn Fn(&Deltas<T>) -> Result<()> + Send + Sync>;

/// Settings for one [`Controller`].
pub struct Config<T> {
    /// The queue the reflector fills and the pop loop drains.
    pub queue: Arc<DeltaFifo<T>>,

    /// Something that can list and watch the objects.
    pub lister_watcher: Arc<dyn ListerWatcher<T>>,

    /// Invoked for every popped delta history.
    pub process: ProcessFunc<T>,

    /// Period between queue resyncs. Zero disables resync.
    pub full_resync_period: Duration,

    /// Consulted before each periodic resync; `None` means always resync.
    pub should_resync: Option<ShouldResyncFunc>,

    /// Re-queue the popped deltas when the processor fails.
    pub retry_on_error: bool,

    /// Called whenever the list/watch connection drops with an error.
    pub watch_error_handler: Option<WatchErrorHandler>,

    /// Requested page size for initial and relist snapshots.
    pub watch_list_page_size: Option<u32>,
}

/// A pump combining a [`Reflector`] and a pop loop into one fixed, standard
/// processing flow.
pub struct Controller<T> {
    config: Config<T>,
    reflector: RwLock<Option<Arc<Reflector<T>>>>,
}

impl<T> Controller<T>
where
    T: Object + ResourceMeta,
{
    pub fn new(config: Config<T>) -> Self {
        Self {
            config,
            reflector: RwLock::new(None),
        }
    }

    /// Run the reflector and the pop loop until `shutdown` fires.
    ///
    /// Two things happen concurrently: the reflector pumps list/watch output
    /// into the queue, and this task repeatedly pops delta histories into
    /// the configured processor. A panicking processor is caught, logged,
    /// and the loop resumes after a one-second floor; the run ends when the
    /// queue observes the shutdown signal and closes.
    pub async fn run(
        &self,
        shutdown: watch::Receiver<()>,
    ) {
        let queue = self.config.queue.clone();
        let mut close_rx = shutdown.clone();
        tokio::spawn(async move {
            let _ = close_rx.changed().await;
            queue.close();
        });

        let reflector = Arc::new(Reflector::new(ReflectorOptions {
            lister_watcher: self.config.lister_watcher.clone(),
            queue: self.config.queue.clone(),
            resync_period: self.config.full_resync_period,
            should_resync: self.config.should_resync.clone(),
            watch_error_handler: self.config.watch_error_handler.clone(),
            page_size: self.config.watch_list_page_size,
        }));
        *self.reflector.write() = Some(reflector.clone());

        let reflector_handle = tokio::spawn({
            let reflector = reflector.clone();
            let shutdown = shutdown.clone();
            async move { reflector.run(shutdown).await }
        });

        loop {
            match AssertUnwindSafe(self.process_loop()).catch_unwind().await {
                Ok(()) => break,
                Err(_panic) => {
                    error!("processor panicked; restarting pop loop");
                    tokio::time::sleep(PROCESS_LOOP_RETRY_FLOOR).await;
                }
            }
        }

        if let Err(err) = reflector_handle.await {
            warn!(error = %err, "reflector task join failed");
        }
    }

    /// Drain the queue until it closes.
    async fn process_loop(&self) {
        loop {
            match self.config.queue.pop(|deltas| (self.config.process)(deltas)).await {
                Ok(_) => {}
                Err(PopError::Closed) => {
                    debug!("pop loop exiting: queue closed");
                    return;
                }
                Err(PopError::Process { deltas, source }) => {
                    warn!(error = %source, "processing popped deltas failed");
                    if self.config.retry_on_error {
                        // The safe way to re-enqueue: preserves any deltas
                        // accepted for the key since the pop.
                        if let Err(err) = self.config.queue.add_if_not_present(deltas) {
                            warn!(error = %err, "re-queue after failure failed");
                        }
                    }
                }
            }
        }
    }

    /// True once the initial resource listing has been fully processed.
    /// Delegates to the queue.
    pub fn has_synced(&self) -> bool {
        self.config.queue.has_synced()
    }

    /// Latest resource version observed by the reflector, or empty before
    /// [`run`](Self::run) publishes one.
    pub fn last_sync_resource_version(&self) -> String {
        self.reflector
            .read()
            .as_ref()
            .map(|r| r.last_sync_resource_version())
            .unwrap_or_default()
    }
}
