use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::WorkItem;

/// Per-item backoff strategy consulted before re-queueing an item.
pub trait RateLimiter<I>: Send + Sync {
    /// How long `item` should wait before its next run.
    fn when(
        &self,
        item: &I,
    ) -> Duration;

    /// Stop tracking `item` - it finished, whether by success or by giving
    /// up. Without this, failure counters grow forever.
    fn forget(
        &self,
        item: &I,
    );

    /// How many failures `item` has accumulated.
    fn num_requeues(
        &self,
        item: &I,
    ) -> usize;
}

/// The default controller limiter: per-item exponential backoff
/// (5ms..1000s) combined with an overall 10 qps / burst-100 token bucket.
pub fn default_controller_rate_limiter<I: WorkItem>() -> Arc<dyn RateLimiter<I>> {
    Arc::new(MaxOfRateLimiter::new(vec![
        Arc::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        )),
        Arc::new(BucketRateLimiter::new(10.0, 100)),
    ]))
}

/// Item-agnostic token bucket adapted to the rate-limiter API.
///
/// `when` takes a reservation: the bucket refills at `qps` up to `burst`
/// tokens, may be driven into debt, and the returned duration is the wait
/// until the reserved token exists.
pub struct BucketRateLimiter {
    state: Mutex<BucketState>,
    qps: f64,
    burst: f64,
}

struct BucketState {
    tokens: f64,
    last: Instant,
}

impl BucketRateLimiter {
    pub fn new(
        qps: f64,
        burst: u32,
    ) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last: Instant::now(),
            }),
            qps,
            burst: burst as f64,
        }
    }
}

impl<I> RateLimiter<I> for BucketRateLimiter {
    fn when(
        &self,
        _item: &I,
    ) -> Duration {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.qps).min(self.burst);
        state.tokens -= 1.0;
        state.last = now;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.qps)
        }
    }

    fn forget(
        &self,
        _item: &I,
    ) {
    }

    fn num_requeues(
        &self,
        _item: &I,
    ) -> usize {
        0
    }
}

/// `min(base * 2^failures, max_delay)` per item, failure count incremented
/// on every `when` call.
pub struct ItemExponentialFailureRateLimiter<I> {
    failures: Mutex<HashMap<I, u32>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<I: WorkItem> ItemExponentialFailureRateLimiter<I> {
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            base_delay,
            max_delay,
        }
    }
}

impl<I: WorkItem> RateLimiter<I> for ItemExponentialFailureRateLimiter<I> {
    fn when(
        &self,
        item: &I,
    ) -> Duration {
        let mut failures = self.failures.lock();
        let counter = failures.entry(item.clone()).or_insert(0);
        let exp = *counter;
        *counter = counter.saturating_add(1);

        // Compute in floating point and bail to max_delay before the cast
        // can overflow.
        let backoff = self.base_delay.as_nanos() as f64 * 2f64.powi(exp.min(i32::MAX as u32) as i32);
        if backoff > u64::MAX as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(backoff as u64).min(self.max_delay)
    }

    fn forget(
        &self,
        item: &I,
    ) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(
        &self,
        item: &I,
    ) -> usize {
        self.failures.lock().get(item).copied().unwrap_or(0) as usize
    }
}

/// Quick retries for the first `max_fast_attempts` failures, slow ones after.
pub struct ItemFastSlowRateLimiter<I> {
    failures: Mutex<HashMap<I, usize>>,
    fast_delay: Duration,
    slow_delay: Duration,
    max_fast_attempts: usize,
}

impl<I: WorkItem> ItemFastSlowRateLimiter<I> {
    pub fn new(
        fast_delay: Duration,
        slow_delay: Duration,
        max_fast_attempts: usize,
    ) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            fast_delay,
            slow_delay,
            max_fast_attempts,
        }
    }
}

impl<I: WorkItem> RateLimiter<I> for ItemFastSlowRateLimiter<I> {
    fn when(
        &self,
        item: &I,
    ) -> Duration {
        let mut failures = self.failures.lock();
        let counter = failures.entry(item.clone()).or_insert(0);
        *counter += 1;
        if *counter <= self.max_fast_attempts {
            self.fast_delay
        } else {
            self.slow_delay
        }
    }

    fn forget(
        &self,
        item: &I,
    ) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(
        &self,
        item: &I,
    ) -> usize {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

/// Worst case across several limiters. With a token bucket in the mix the
/// burst can apparently be exceeded when individual items were separately
/// delayed longer.
pub struct MaxOfRateLimiter<I> {
    limiters: Vec<Arc<dyn RateLimiter<I>>>,
}

impl<I> MaxOfRateLimiter<I> {
    pub fn new(limiters: Vec<Arc<dyn RateLimiter<I>>>) -> Self {
        Self { limiters }
    }
}

impl<I: WorkItem> RateLimiter<I> for MaxOfRateLimiter<I> {
    fn when(
        &self,
        item: &I,
    ) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(
        &self,
        item: &I,
    ) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(
        &self,
        item: &I,
    ) -> usize {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}
