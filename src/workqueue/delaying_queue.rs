use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::WorkItem;
use crate::WorkQueue;

/// Upper bound on how long the background worker sleeps with nothing
/// scheduled, so a wedged timer can never stall it forever.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(10);

/// A [`WorkQueue`] extended with scheduled future insertions.
///
/// `add_after` hands `(item, ready-time)` to a background task over a
/// channel - the caller never blocks beyond the hand-off. The task keeps a
/// min-heap ordered by ready-time and releases items into the inner queue in
/// ready-time order, ties broken by arrival order. Scheduling an item that
/// is already pending keeps the earlier ready-time; later ones are ignored.
pub struct DelayingQueue<I> {
    queue: WorkQueue<I>,
    waiting_tx: mpsc::UnboundedSender<WaitingItem<I>>,
    shutdown_tx: Arc<watch::Sender<()>>,
}

impl<I> Clone for DelayingQueue<I> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            waiting_tx: self.waiting_tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

struct WaitingItem<I> {
    item: I,
    ready_at: Instant,
}

struct HeapEntry<I> {
    ready_at: Instant,
    seq: u64,
    item: I,
}

impl<I> PartialEq for HeapEntry<I> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl<I> Eq for HeapEntry<I> {}

impl<I> PartialOrd for HeapEntry<I> {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for HeapEntry<I> {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.ready_at
            .cmp(&other.ready_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl<I: WorkItem> Default for DelayingQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: WorkItem> DelayingQueue<I> {
    pub fn new() -> Self {
        Self::named("")
    }

    pub fn named(name: &str) -> Self {
        let queue = WorkQueue::named(name);
        let (waiting_tx, waiting_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::spawn(waiting_loop(queue.clone(), waiting_rx, shutdown_rx));
        Self {
            queue,
            waiting_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Make `item` eligible for processing after `delay`. Non-positive
    /// delays enqueue immediately.
    pub fn add_after(
        &self,
        item: I,
        delay: Duration,
    ) {
        if self.queue.shutting_down() {
            return;
        }
        self.queue.note_retry();
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }
        let _ = self.waiting_tx.send(WaitingItem {
            item,
            ready_at: Instant::now() + delay,
        });
    }

    pub fn add(
        &self,
        item: I,
    ) {
        self.queue.add(item)
    }

    pub async fn get(&self) -> Option<I> {
        self.queue.get().await
    }

    pub fn done(
        &self,
        item: I,
    ) {
        self.queue.done(item)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Stop the scheduling worker (pending delayed items are dropped) and
    /// shut the inner queue down.
    pub fn shut_down(&self) {
        let _ = self.shutdown_tx.send(());
        self.queue.shut_down();
    }

    pub async fn shut_down_with_drain(&self) {
        let _ = self.shutdown_tx.send(());
        self.queue.shut_down_with_drain().await;
    }

    pub fn shutting_down(&self) -> bool {
        self.queue.shutting_down()
    }
}

async fn waiting_loop<I: WorkItem>(
    queue: WorkQueue<I>,
    mut waiting_rx: mpsc::UnboundedReceiver<WaitingItem<I>>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut heap: BinaryHeap<Reverse<HeapEntry<I>>> = BinaryHeap::new();
    // Authoritative ready-time per item. A heap entry that disagrees is
    // stale (the item was re-scheduled earlier) and gets skipped on pop.
    let mut known: HashMap<I, Instant> = HashMap::new();
    let mut seq: u64 = 0;

    loop {
        let now = Instant::now();
        let mut next_ready: Option<Instant> = None;
        while let Some(Reverse(entry)) = heap.pop() {
            if known.get(&entry.item) != Some(&entry.ready_at) {
                continue;
            }
            if entry.ready_at <= now {
                known.remove(&entry.item);
                queue.add(entry.item);
                continue;
            }
            next_ready = Some(entry.ready_at);
            heap.push(Reverse(entry));
            break;
        }

        let wake_at = next_ready.unwrap_or(now + MAX_IDLE_WAIT);
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!(pending = known.len(), "delaying queue worker stopping");
                return;
            }
            incoming = waiting_rx.recv() => {
                match incoming {
                    Some(waiting) => {
                        schedule(&mut heap, &mut known, &mut seq, waiting);
                        // Batch whatever else is already in the channel
                        // before recomputing the deadline.
                        while let Ok(waiting) = waiting_rx.try_recv() {
                            schedule(&mut heap, &mut known, &mut seq, waiting);
                        }
                    }
                    None => {
                        debug!("delaying queue handles dropped; worker stopping");
                        return;
                    }
                }
            }
            _ = tokio::time::sleep_until(wake_at) => {}
        }
    }
}

fn schedule<I: WorkItem>(
    heap: &mut BinaryHeap<Reverse<HeapEntry<I>>>,
    known: &mut HashMap<I, Instant>,
    seq: &mut u64,
    waiting: WaitingItem<I>,
) {
    if let Some(existing) = known.get(&waiting.item) {
        // The earlier ready-time wins.
        if *existing <= waiting.ready_at {
            return;
        }
    }
    known.insert(waiting.item.clone(), waiting.ready_at);
    *seq += 1;
    heap.push(Reverse(HeapEntry {
        ready_at: waiting.ready_at,
        seq: *seq,
        item: waiting.item,
    }));
}
