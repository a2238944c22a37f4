//! Concurrent key→object storage with secondary indices.
//!
//! [`ThreadSafeStore`] is the locked map plus index bookkeeping;
//! [`Cache`] layers a [`KeyFunc`](crate::KeyFunc) on top so callers can pass
//! objects instead of keys. The cache doubles as the *known objects* view the
//! delta FIFO consults when synthesizing deletions and resync deltas.

mod cache;
mod thread_safe_store;

pub use cache::*;
pub use thread_safe_store::*;

#[cfg(test)]
mod cache_test;

/// Read-only view over the cache of known objects, consumed by the delta
/// FIFO during `replace` and `resync`.
pub trait KnownObjects<T>: Send + Sync {
    /// Keys of all objects currently known.
    fn list_keys(&self) -> Vec<String>;

    /// Last known state for a key, if any.
    fn get_by_key(
        &self,
        key: &str,
    ) -> Option<T>;
}
