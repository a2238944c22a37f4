use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;
use tracing::warn;

use crate::Delta;
use crate::DeltaKind;
use crate::DeltaObject;
use crate::DeletedFinalStateUnknown;
use crate::Deltas;
use crate::Error;
use crate::KeyError;
use crate::KeyFunc;
use crate::KnownObjects;
use crate::Object;
use crate::QueueError;
use crate::Result;

/// Construction options for [`DeltaFifo`].
pub struct DeltaFifoOptions<T> {
    /// Derives the queue key for incoming objects. Required.
    pub key_fn: KeyFunc<T>,

    /// Read-only view over the cache of known objects. When set, `replace`
    /// synthesizes deletions for keys that vanished from the snapshot, and
    /// `resync` re-emits quiescent keys.
    pub known_objects: Option<Arc<dyn KnownObjects<T>>>,

    /// Emit `Replaced` for snapshot replays instead of the legacy `Sync`.
    pub emit_replaced: bool,
}

/// Error returned by [`DeltaFifo::pop`].
///
/// Processing failures carry the deltas that were already removed from the
/// queue, so the caller can decide to re-queue them.
pub enum PopError<T> {
    /// The FIFO was closed; the consumer loop should exit.
    Closed,
    /// The processor failed on the popped deltas.
    Process {
        deltas: Deltas<T>,
        source: Box<Error>,
    },
}

impl<T: fmt::Debug> fmt::Debug for PopError<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PopError::Closed => f.write_str("Closed"),
            PopError::Process { deltas, source } => f
                .debug_struct("Process")
                .field("deltas", deltas)
                .field("source", source)
                .finish(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for PopError<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PopError::Closed => f.write_str("queue is closed"),
            PopError::Process { source, .. } => {
                write!(f, "processing popped deltas failed: {source}")
            }
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PopError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PopError::Closed => None,
            PopError::Process { source, .. } => Some(source.as_ref()),
        }
    }
}

/// A queue whose element at each key is the ordered history of observations
/// for that key since the last pop.
///
/// One mutex protects items, queue order, and population bookkeeping; a
/// notifier plays the condition-variable role (one waiter woken per append,
/// all waiters woken on close). `pop` invokes the processor **while holding
/// the lock**, so removal from the queue and delivery to the processor are
/// observed atomically - the processor must be fast and must not re-enter
/// the same FIFO.
pub struct DeltaFifo<T> {
    state: Mutex<FifoState<T>>,
    cond: Notify,
    key_fn: KeyFunc<T>,
    known_objects: Option<Arc<dyn KnownObjects<T>>>,
    emit_replaced: bool,
}

struct FifoState<T> {
    /// Key → pending delta history. A key appears in `queue` iff it appears
    /// here, and its history is never empty.
    items: HashMap<String, Vec<Delta<T>>>,
    /// Insertion order of first appearance since the key was last popped.
    queue: VecDeque<String>,
    /// True once any data was inserted.
    populated: bool,
    /// Keys delivered by the first replace and not yet popped.
    initial_population_count: usize,
    closed: bool,
}

impl<T: Object> DeltaFifo<T> {
    /// A FIFO with no known-objects view and legacy `Sync` replays.
    pub fn new(key_fn: KeyFunc<T>) -> Self {
        Self::with_options(DeltaFifoOptions {
            key_fn,
            known_objects: None,
            emit_replaced: false,
        })
    }

    pub fn with_options(options: DeltaFifoOptions<T>) -> Self {
        Self {
            state: Mutex::new(FifoState {
                items: HashMap::new(),
                queue: VecDeque::new(),
                populated: false,
                initial_population_count: 0,
                closed: false,
            }),
            cond: Notify::new(),
            key_fn: options.key_fn,
            known_objects: options.known_objects,
            emit_replaced: options.emit_replaced,
        }
    }

    /// Append an `Added` delta for the object's key.
    pub fn add(
        &self,
        obj: T,
    ) -> Result<()> {
        self.enqueue(DeltaKind::Added, obj)
    }

    /// Append an `Updated` delta for the object's key.
    pub fn update(
        &self,
        obj: T,
    ) -> Result<()> {
        self.enqueue(DeltaKind::Updated, obj)
    }

    /// Append a `Deleted` delta for the object's key. Redundant deletes -
    /// keys unknown to both the cache view and this queue - are dropped.
    pub fn delete(
        &self,
        obj: T,
    ) -> Result<()> {
        let key = (self.key_fn)(&obj)?;
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.populated = true;
        let queued = state.items.contains_key(&key);
        match &self.known_objects {
            None => {
                if !queued {
                    // Presumably already deleted; nothing to tell downstream.
                    return Ok(());
                }
            }
            Some(known) => {
                if known.get_by_key(&key).is_none() && !queued {
                    return Ok(());
                }
            }
        }
        self.queue_action_locked(&mut state, DeltaKind::Deleted, DeltaObject::Object(obj))?;
        Ok(())
    }

    /// Replay a full snapshot.
    ///
    /// Every listed object gets a `Replaced` (or legacy `Sync`) delta, and
    /// every key the cache view knows that is absent from the snapshot gets a
    /// synthesized `Deleted` carrying a [`DeletedFinalStateUnknown`]. The
    /// first replace establishes the initial population that
    /// [`has_synced`](Self::has_synced) waits for.
    pub fn replace(
        &self,
        list: Vec<T>,
        resource_version: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        let kind = if self.emit_replaced {
            DeltaKind::Replaced
        } else {
            DeltaKind::Sync
        };

        let mut keys: HashSet<String> = HashSet::with_capacity(list.len());
        for obj in list {
            let key = (self.key_fn)(&obj)?;
            keys.insert(key);
            self.queue_action_locked(&mut state, kind, DeltaObject::Object(obj))?;
        }

        let mut queued_deletions = 0usize;
        match &self.known_objects {
            None => {
                // No cache view: detect deletions against our own pending
                // state.
                let stale: Vec<(String, Option<T>)> = state
                    .items
                    .iter()
                    .filter(|(key, _)| !keys.contains(*key))
                    .map(|(key, deltas)| {
                        let last = deltas.last().and_then(|d| d.object.object().cloned());
                        (key.clone(), last)
                    })
                    .collect();
                for (key, object) in stale {
                    queued_deletions += 1;
                    self.queue_deleted_tombstone(&mut state, key, object)?;
                }
            }
            Some(known) => {
                for key in known.list_keys() {
                    if keys.contains(&key) {
                        continue;
                    }
                    let object = known.get_by_key(&key);
                    queued_deletions += 1;
                    self.queue_deleted_tombstone(&mut state, key, object)?;
                }
            }
        }

        if !state.populated {
            state.populated = true;
            state.initial_population_count = keys.len() + queued_deletions;
        }
        trace!(
            resource_version,
            keys = keys.len(),
            synthesized_deletes = queued_deletions,
            "snapshot replayed"
        );
        Ok(())
    }

    /// Append a `Sync` delta for every known key that has no pending deltas.
    /// A no-op without a known-objects view.
    pub fn resync(&self) -> Result<()> {
        let Some(known) = &self.known_objects else {
            return Ok(());
        };
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        for key in known.list_keys() {
            // A pending delta already forces reprocessing; re-syncing on top
            // of it would reorder history.
            if state.items.contains_key(&key) {
                continue;
            }
            let Some(obj) = known.get_by_key(&key) else {
                continue;
            };
            self.queue_action_locked(&mut state, DeltaKind::Sync, DeltaObject::Object(obj))?;
        }
        Ok(())
    }

    /// Block until the queue is non-empty or the FIFO is closed; remove the
    /// head key and hand its delta history to `process` while still holding
    /// the lock.
    ///
    /// A processor returning [`Error::Requeue`] has the deltas re-inserted at
    /// the head atomically; any inner error is surfaced to the caller. Other
    /// processor errors propagate after the key is already removed - the
    /// deltas ride along in [`PopError::Process`] so callers can re-queue via
    /// [`add_if_not_present`](Self::add_if_not_present).
    pub async fn pop<F>(
        &self,
        mut process: F,
    ) -> std::result::Result<Deltas<T>, PopError<T>>
    where
        F: FnMut(&Deltas<T>) -> Result<()>,
    {
        let notified = self.cond.notified();
        tokio::pin!(notified);
        loop {
            // Arm the waiter before checking state so a signal between the
            // check and the await is not lost.
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if let Some((key, deltas)) = Self::pop_front_locked(&mut state) {
                    let deltas = Deltas(deltas);
                    return match process(&deltas) {
                        Ok(()) => Ok(deltas),
                        Err(Error::Requeue(inner)) => {
                            self.add_if_not_present_locked(&mut state, key, deltas.clone());
                            match inner {
                                None => Ok(deltas),
                                Some(source) => Err(PopError::Process { deltas, source }),
                            }
                        }
                        Err(err) => Err(PopError::Process {
                            deltas,
                            source: Box::new(err),
                        }),
                    };
                }
                if state.closed {
                    return Err(PopError::Closed);
                }
            }
            notified.as_mut().await;
            notified.set(self.cond.notified());
        }
    }

    /// Insert a delta history at the head of the queue unless its key is
    /// already pending; if it is, the history is prepended so the order of
    /// accepted deltas is preserved. This is the safe way to put back the
    /// result of a failed pop.
    pub fn add_if_not_present(
        &self,
        deltas: Deltas<T>,
    ) -> Result<()> {
        let Some(newest) = deltas.newest() else {
            return Err(QueueError::EmptyDeltas.into());
        };
        let key = newest.object.key(&self.key_fn)?;
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        self.add_if_not_present_locked(&mut state, key, deltas);
        Ok(())
    }

    /// True once the initial population delivered by the first replace has
    /// been fully drained to the processor.
    pub fn has_synced(&self) -> bool {
        let state = self.state.lock();
        state.populated && state.initial_population_count == 0
    }

    /// Close the FIFO: all blocked [`pop`](Self::pop) callers wake and
    /// observe [`PopError::Closed`]; subsequent mutations are silently
    /// ignored.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.cond.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Newest payload per pending key.
    pub fn list(&self) -> Vec<DeltaObject<T>> {
        let state = self.state.lock();
        state
            .items
            .values()
            .filter_map(|deltas| deltas.last().map(|d| d.object.clone()))
            .collect()
    }

    /// Keys with pending deltas.
    pub fn list_keys(&self) -> Vec<String> {
        self.state.lock().items.keys().cloned().collect()
    }

    /// Pending delta history for the object sharing `obj`'s key.
    pub fn get(
        &self,
        obj: &T,
    ) -> Result<Option<Deltas<T>>> {
        let key = (self.key_fn)(obj)?;
        Ok(self.get_by_key(&key))
    }

    pub fn get_by_key(
        &self,
        key: &str,
    ) -> Option<Deltas<T>> {
        self.state
            .lock()
            .items
            .get(key)
            .map(|deltas| Deltas(deltas.clone()))
    }

    fn enqueue(
        &self,
        kind: DeltaKind,
        obj: T,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.populated = true;
        self.queue_action_locked(&mut state, kind, DeltaObject::Object(obj))?;
        Ok(())
    }

    fn queue_deleted_tombstone(
        &self,
        state: &mut FifoState<T>,
        key: String,
        object: Option<T>,
    ) -> std::result::Result<(), KeyError> {
        self.queue_action_locked(
            state,
            DeltaKind::Deleted,
            DeltaObject::FinalStateUnknown(DeletedFinalStateUnknown { key, object }),
        )
    }

    fn queue_action_locked(
        &self,
        state: &mut FifoState<T>,
        kind: DeltaKind,
        payload: DeltaObject<T>,
    ) -> std::result::Result<(), KeyError> {
        let key = payload.key(&self.key_fn)?;
        let exists = state.items.contains_key(&key);
        let entry = state.items.entry(key.clone()).or_default();
        entry.push(Delta {
            kind,
            object: payload,
        });
        dedup_deltas(entry);
        if !exists {
            state.queue.push_back(key);
        }
        self.cond.notify_one();
        Ok(())
    }

    fn pop_front_locked(state: &mut FifoState<T>) -> Option<(String, Vec<Delta<T>>)> {
        while let Some(key) = state.queue.pop_front() {
            if state.initial_population_count > 0 {
                state.initial_population_count -= 1;
            }
            match state.items.remove(&key) {
                Some(deltas) => return Some((key, deltas)),
                None => {
                    // Queued key without a history breaks the queue↔items
                    // invariant; skip it rather than deliver nothing.
                    warn!(%key, "queued key had no pending deltas");
                }
            }
        }
        None
    }

    fn add_if_not_present_locked(
        &self,
        state: &mut FifoState<T>,
        key: String,
        deltas: Deltas<T>,
    ) {
        state.populated = true;
        match state.items.get_mut(&key) {
            Some(existing) => {
                // The re-queued history is older than anything accepted
                // since the pop: splice it in front, collapsing a deletion
                // pair at the junction.
                let mut merged = deltas.0;
                let boundary = merged.len();
                merged.append(existing);
                if boundary > 0
                    && merged.len() > boundary
                    && merged[boundary - 1].kind == DeltaKind::Deleted
                    && merged[boundary].kind == DeltaKind::Deleted
                {
                    merged.remove(boundary - 1);
                }
                *existing = merged;
            }
            None => {
                state.items.insert(key.clone(), deltas.0);
                state.queue.push_front(key);
            }
        }
        self.cond.notify_one();
    }
}

/// Collapse two consecutive `Deleted` deltas to the later observation. No
/// other pair compresses.
fn dedup_deltas<T>(deltas: &mut Vec<Delta<T>>) {
    let n = deltas.len();
    if n < 2 {
        return;
    }
    if deltas[n - 1].kind == DeltaKind::Deleted && deltas[n - 2].kind == DeltaKind::Deleted {
        deltas.remove(n - 2);
    }
}
