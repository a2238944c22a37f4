//! Queue metrics as an injected capability.
//!
//! Hosts install a single [`MetricsProvider`] process-wide (one-time
//! contract); queues constructed afterwards report into it. Without a
//! provider every hook is a no-op and no reporting task is spawned.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::warn;

/// Per-queue sink for work-queue activity.
pub trait QueueMetrics: Send + Sync {
    /// An item was accepted into the queue.
    fn add(&self);

    /// An item was handed to a worker.
    fn get(&self);

    /// A worker finished an item.
    fn done(&self);

    /// An item was re-scheduled through `add_after`.
    fn retry(&self);

    /// Periodic report: total in-flight processing time and the single
    /// longest-running item.
    fn update_unfinished_work(
        &self,
        unfinished: Duration,
        longest_running: Duration,
    );
}

/// Builds a [`QueueMetrics`] sink per named queue.
pub trait MetricsProvider: Send + Sync {
    fn queue_metrics(
        &self,
        name: &str,
    ) -> Arc<dyn QueueMetrics>;
}

static METRICS_PROVIDER: OnceCell<Arc<dyn MetricsProvider>> = OnceCell::new();

/// Install the process-wide metrics provider. Only the first call wins;
/// later calls are ignored with a warning and return `false`.
pub fn set_metrics_provider(provider: Arc<dyn MetricsProvider>) -> bool {
    let installed = METRICS_PROVIDER.set(provider).is_ok();
    if !installed {
        warn!("metrics provider already installed; ignoring replacement");
    }
    installed
}

/// Sink for a queue with the given name, if a provider is installed.
pub(crate) fn metrics_for(name: &str) -> Option<Arc<dyn QueueMetrics>> {
    METRICS_PROVIDER.get().map(|provider| provider.queue_metrics(name))
}
