//! Error hierarchy for the cache-and-dispatch core,
//! categorized by subsystem and operational concern.

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Indexed-store configuration and lookup failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Queue lifecycle failures
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Key-function failures
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Processor request to put the popped deltas back at the head of the
    /// FIFO. Handled inside `DeltaFifo::pop`; the inner error, if any, is
    /// what the pop caller observes.
    #[error("requeue requested")]
    Requeue(#[source] Option<Box<Error>>),

    /// Watch stream ended without an error from the source
    #[error("watch stream closed")]
    WatchClosed,

    /// Transport failure reported by a `ListerWatcher` implementation
    #[error("list/watch failed: {0}")]
    ListWatch(String),

    /// Retry/backoff policy validation failure
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lookup against an index name that was never registered
    #[error("index with name {name} does not exist")]
    UnknownIndex { name: String },

    /// A race-free index rebuild would require a full pause, so indexers
    /// must be installed before the first insertion.
    #[error("cannot add indexers to a populated store")]
    StorePopulated,

    /// New indexer names overlap with already-registered ones
    #[error("indexer conflict: {names:?}")]
    IndexerConflict { names: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The FIFO or work queue was closed while a consumer was blocked on it
    #[error("queue is closed")]
    Closed,

    /// `add_if_not_present` was handed an empty delta list
    #[error("0-length deltas carry no key")]
    EmptyDeltas,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The key function could not derive a key from the object
    #[error("couldn't create key for object {object}: {reason}")]
    Failed { object: String, reason: String },

    /// A packed key did not split back into namespace/name
    #[error("unexpected key format: {key:?}")]
    BadFormat { key: String },
}

impl KeyError {
    pub fn failed<O: std::fmt::Debug>(
        object: &O,
        reason: impl Into<String>,
    ) -> Self {
        KeyError::Failed {
            object: format!("{object:?}"),
            reason: reason.into(),
        }
    }
}

impl Error {
    /// True when the error means the queue was closed and the consumer loop
    /// should exit cleanly.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Queue(QueueError::Closed))
    }
}
