use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::metrics::metrics_for;
use crate::QueueMetrics;
use crate::WorkItem;

pub(crate) const UNFINISHED_WORK_UPDATE_PERIOD: Duration = Duration::from_millis(500);

/// FIFO work queue with dedup and in-flight tracking.
///
/// For any item the queue guarantees at most one worker processes it at any
/// moment: an item re-added while a worker holds it lands in the dirty set
/// only and re-enters the queue when the worker calls [`done`](Self::done),
/// so bursts of duplicate adds coalesce into a single follow-up run.
///
/// Handles are cheap clones sharing one queue.
pub struct WorkQueue<I> {
    inner: Arc<QueueInner<I>>,
}

impl<I> Clone for WorkQueue<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct QueueInner<I> {
    state: Mutex<QueueState<I>>,
    cond: Notify,
    metrics: Option<Arc<dyn QueueMetrics>>,
}

struct QueueState<I> {
    /// Processing order. Every element is in `dirty` and not in `processing`.
    queue: VecDeque<I>,
    /// Everything that needs processing.
    dirty: HashSet<I>,
    /// Items currently held by workers. May overlap `dirty` when an item was
    /// re-added mid-processing.
    processing: HashSet<I>,
    /// When each in-flight item was handed out. Maintained only while a
    /// metrics sink is installed.
    processing_started: HashMap<I, Instant>,
    shutting_down: bool,
}

impl<I: WorkItem> Default for WorkQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: WorkItem> WorkQueue<I> {
    pub fn new() -> Self {
        Self::named("")
    }

    /// A queue reporting into the installed metrics provider under `name`.
    /// The unfinished-work reporter task is spawned only when a provider is
    /// installed.
    pub fn named(name: &str) -> Self {
        let metrics = metrics_for(name);
        let queue = Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    processing_started: HashMap::new(),
                    shutting_down: false,
                }),
                cond: Notify::new(),
                metrics,
            }),
        };
        if queue.inner.metrics.is_some() {
            tokio::spawn(unfinished_work_loop(queue.inner.clone()));
        }
        queue
    }

    /// Mark `item` as needing processing. No-op while shutting down or when
    /// the item is already pending.
    pub fn add(
        &self,
        item: I,
    ) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            return;
        }
        if state.dirty.contains(&item) {
            return;
        }
        if let Some(metrics) = &self.inner.metrics {
            metrics.add();
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            // A worker holds it; done() will re-queue.
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.inner.cond.notify_one();
    }

    /// Current queue length, for informational purposes only - gating `add`
    /// or `get` on it cannot be synchronized.
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// Block until an item is available. `None` means the queue is shutting
    /// down and the worker should exit. Every `Some` must be paired with a
    /// [`done`](Self::done) call.
    pub async fn get(&self) -> Option<I> {
        let notified = self.inner.cond.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    if let Some(metrics) = &self.inner.metrics {
                        metrics.get();
                        state.processing_started.insert(item.clone(), Instant::now());
                    }
                    state.processing.insert(item.clone());
                    state.dirty.remove(&item);
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.as_mut().await;
            notified.set(self.inner.cond.notified());
        }
    }

    /// Mark `item` as finished. If it was re-added while being processed it
    /// re-enters the queue for one follow-up run.
    pub fn done(
        &self,
        item: I,
    ) {
        let mut state = self.inner.state.lock();
        if let Some(metrics) = &self.inner.metrics {
            metrics.done();
        }
        state.processing.remove(&item);
        state.processing_started.remove(&item);
        if state.dirty.contains(&item) {
            state.queue.push_back(item);
            drop(state);
            self.inner.cond.notify_one();
        } else if state.processing.is_empty() {
            // Unblock shut_down_with_drain.
            drop(state);
            self.inner.cond.notify_waiters();
        }
    }

    /// Ignore all further adds and wake every blocked [`get`](Self::get).
    /// Workers drain what is already queued, then observe shutdown.
    pub fn shut_down(&self) {
        let mut state = self.inner.state.lock();
        state.shutting_down = true;
        drop(state);
        self.inner.cond.notify_waiters();
    }

    /// [`shut_down`](Self::shut_down), then wait until every in-flight item
    /// has been marked [`done`](Self::done).
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        let notified = self.inner.cond.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock();
                if state.processing.is_empty() {
                    return;
                }
            }
            notified.as_mut().await;
            notified.set(self.inner.cond.notified());
        }
    }

    pub fn shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }

    pub(crate) fn note_retry(&self) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.retry();
        }
    }
}

async fn unfinished_work_loop<I: WorkItem>(inner: Arc<QueueInner<I>>) {
    let mut ticker = tokio::time::interval(UNFINISHED_WORK_UPDATE_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let report = {
            let state = inner.state.lock();
            if state.shutting_down {
                None
            } else {
                let now = Instant::now();
                let mut unfinished = Duration::ZERO;
                let mut longest = Duration::ZERO;
                for started in state.processing_started.values() {
                    let elapsed = now.saturating_duration_since(*started);
                    unfinished += elapsed;
                    longest = longest.max(elapsed);
                }
                Some((unfinished, longest))
            }
        };
        let Some((unfinished, longest)) = report else {
            debug!("unfinished-work reporter stopping: queue shut down");
            return;
        };
        if let Some(metrics) = &inner.metrics {
            metrics.update_unfinished_work(unfinished, longest);
        }
    }
}
