use std::sync::Arc;
use std::time::Duration;

use crate::DelayingQueue;
use crate::RateLimiter;
use crate::WorkItem;

/// A [`DelayingQueue`] whose re-adds are paced by a [`RateLimiter`].
///
/// Remember to call [`forget`](Self::forget) once an item stops being
/// retried - whether it finally succeeded or was permanently dropped -
/// otherwise its failure counter grows forever. `forget` only clears the
/// limiter; the [`done`](Self::done) obligation stays with the caller.
pub struct RateLimitingQueue<I> {
    delaying: DelayingQueue<I>,
    limiter: Arc<dyn RateLimiter<I>>,
}

impl<I> Clone for RateLimitingQueue<I> {
    fn clone(&self) -> Self {
        Self {
            delaying: self.delaying.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<I: WorkItem> RateLimitingQueue<I> {
    pub fn new(limiter: Arc<dyn RateLimiter<I>>) -> Self {
        Self::named(limiter, "")
    }

    pub fn named(
        limiter: Arc<dyn RateLimiter<I>>,
        name: &str,
    ) -> Self {
        Self {
            delaying: DelayingQueue::named(name),
            limiter,
        }
    }

    /// Enqueue `item` once the rate limiter says it is ok.
    pub fn add_rate_limited(
        &self,
        item: I,
    ) {
        let delay = self.limiter.when(&item);
        self.delaying.add_after(item, delay);
    }

    /// Clear the limiter's tracking for `item`. Does **not** call `done`.
    pub fn forget(
        &self,
        item: &I,
    ) {
        self.limiter.forget(item);
    }

    pub fn num_requeues(
        &self,
        item: &I,
    ) -> usize {
        self.limiter.num_requeues(item)
    }

    pub fn add(
        &self,
        item: I,
    ) {
        self.delaying.add(item)
    }

    pub fn add_after(
        &self,
        item: I,
        delay: Duration,
    ) {
        self.delaying.add_after(item, delay)
    }

    pub async fn get(&self) -> Option<I> {
        self.delaying.get().await
    }

    pub fn done(
        &self,
        item: I,
    ) {
        self.delaying.done(item)
    }

    pub fn len(&self) -> usize {
        self.delaying.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delaying.is_empty()
    }

    pub fn shut_down(&self) {
        self.delaying.shut_down()
    }

    pub async fn shut_down_with_drain(&self) {
        self.delaying.shut_down_with_drain().await
    }

    pub fn shutting_down(&self) -> bool {
        self.delaying.shutting_down()
    }
}
