//! # watchcache
//!
//! Client-side cache-and-dispatch core for agents that observe a remote
//! authoritative store of typed resources and react to changes.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐      ┌────────────┐      ┌──────────────┐
//! │ ListerWatcher  │─────▶│ Reflector  │─────▶│  DeltaFifo   │
//! │ (your source)  │ list │ (adapter)  │ push │ (per-key     │
//! └────────────────┘ watch└────────────┘      │  histories)  │
//!                                             └──────┬───────┘
//!                                                    │ pop
//!                                                    ▼
//!                    ┌───────────┐  update    ┌──────────────┐
//!                    │   Cache   │◀───────────│  Controller  │
//!                    │ (indexed  │            │ (pump loop)  │
//!                    │  store)   │            └──────┬───────┘
//!                    └───────────┘                   │ notify
//!                                                    ▼
//!                                             user handlers
//! ```
//!
//! Reconcilers schedule keys onto a [`RateLimitingQueue`]; workers drain it,
//! consult the [`Cache`], and re-enqueue failures with per-item backoff.
//!
//! ## What this crate provides
//!
//! - **Delta FIFO** - an ordered queue whose elements carry the history of
//!   changes to a keyed object, so a downstream processor never loses
//!   intermediate transitions.
//! - **Indexed thread-safe store** - a concurrent key→object map with
//!   user-defined secondary indices, doubling as the knowledge base consulted
//!   during resync.
//! - **Controller loop** - a pump that drives a list/watch source into the
//!   FIFO and pops deltas into a user-supplied processor, plus rate-limiting
//!   delayed work queues for reconcile scheduling.
//!
//! The list/watch transport itself is **your responsibility**: implement
//! [`ListerWatcher`] over whatever wire protocol your control plane speaks.
//! This crate never dials sockets and never parses wire formats.

mod controller;
mod delta_fifo;
mod errors;
mod handler;
mod informer;
mod key;
mod store;
mod workqueue;

pub use controller::*;
pub use delta_fifo::*;
pub use errors::*;
pub use handler::*;
pub use informer::*;
pub use key::*;
pub use store::*;
pub use workqueue::*;

#[cfg(test)]
mod handler_test;
#[cfg(test)]
mod key_test;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
