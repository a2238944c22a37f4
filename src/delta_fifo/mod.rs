//! Ordered queue of per-key delta histories.
//!
//! Where a plain FIFO would hand a processor only the latest state of a key,
//! [`DeltaFifo`] hands it the full ordered history of observations since the
//! last pop, so intermediate transitions survive relists and resyncs.
//!
//! ```text
//! add/update/delete ──▶ items["ns/a"] = [Added v1, Updated v2]
//! replace(snapshot)  ──▶ Replaced per listed key,
//!                        synthesized Deleted for vanished known keys
//! resync()           ──▶ Sync for quiescent known keys
//! pop(process)       ──▶ process(&deltas) for the head key, under the lock
//! ```

mod delta;
mod fifo;

pub use delta::*;
pub use fifo::*;
