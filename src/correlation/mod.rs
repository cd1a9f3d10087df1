//! Correlation subsystem.
//!
//! # Data Flow
//! ```text
//! BrokeredStrategy::call
//!     → id.rs (fresh CorrelationId per attempt)
//!     → table.rs register → PendingHandle (owned by the caller)
//!     → ... publish, wait on the handle with a deadline ...
//!
//! ReplyListener (independent task)
//!     → table.rs resolve(id, result) → wakes the waiting caller
//!
//! Caller exits (reply, timeout, or cancellation by drop)
//!     → PendingHandle::drop removes the slot
//! ```
//!
//! # Design Decisions
//! - Resolution is `DashMap::remove` followed by a oneshot send: whoever removes
//!   the slot is its only writer, so exactly one of reply/timeout/reap wins
//! - The listener never blocks on a caller (oneshot send is non-blocking)
//! - Unknown and duplicate replies are logged and counted, never surfaced

pub mod id;
pub mod table;

pub use id::CorrelationId;
pub use table::{CorrelationTable, PendingHandle, SlotResult, TableError};
