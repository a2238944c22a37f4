//! Rate-limited work queues for reconcile scheduling.
//!
//! Layered bottom-up:
//!
//! 1. [`WorkQueue`] - FIFO with dedup and at-most-one-in-flight-per-item
//!    tracking.
//! 2. [`DelayingQueue`] - adds `add_after` for scheduled future insertions.
//! 3. [`RateLimitingQueue`] - composes a [`RateLimiter`] with the delaying
//!    queue so failed items come back with per-item backoff.
//!
//! A typical worker:
//!
//! ```ignore
//! while let Some(key) = queue.get().await {
//!     match reconcile(&key).await {
//!         Ok(()) => queue.forget(&key),
//!         Err(_) => queue.add_rate_limited(key.clone()),
//!     }
//!     queue.done(key);
//! }
//! ```

mod delaying_queue;
mod metrics;
mod policy;
mod queue;
mod rate_limiter;
mod rate_limiting_queue;

pub use delaying_queue::*;
pub use metrics::*;
pub use policy::*;
pub use queue::*;
pub use rate_limiter::*;
pub use rate_limiting_queue::*;

#[cfg(test)]
mod rate_limiting_queue_test;

use std::fmt::Debug;
use std::hash::Hash;

/// Marker bound for items schedulable on the work queues. Keys are the
/// common case; any cheap-to-clone hashable value works.
pub trait WorkItem: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<I> WorkItem for I where I: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
