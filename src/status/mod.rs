//! Worker-to-main status plumbing
//!
//! Three cooperating pieces behind the [`AsyncCallback`] facade:
//!
//! ```text
//! Worker threads                        Main thread
//! │
//! ├── counters ──► StatDeltas (atomics) ──► drained per tick
//! ├── status   ──► StatusRegistry (lock) ──► representative line per tick
//! └── log/error ─► RequestChannel (cv)  ──► serviced without delay
//! ```
//!
//! The registry and the channel use two independent mutexes that are
//! never held simultaneously; the counters are lock-free.

pub mod async_callback;
pub mod channel;
pub mod registry;
pub mod stats;

pub use async_callback::AsyncCallback;
pub use channel::{RequestChannel, ServiceOutcome};
pub use registry::StatusRegistry;
pub use stats::StatDeltas;
