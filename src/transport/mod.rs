//! Transport strategies.
//!
//! # Data Flow
//! ```text
//! Strategy::call(capability, payload, deadline)
//!     → Direct:   direct.rs   POST {base_url}/capabilities/{capability}
//!     → Brokered: brokered.rs register slot → publish → wait (deadline)
//! ```
//!
//! # Design Decisions
//! - Both backends implement the same call contract; the variant is chosen
//!   once at construction and never switched at runtime
//! - Every failure is surfaced as a typed `CallError` for the resilience layer

pub mod brokered;
pub mod direct;

use bytes::Bytes;
use std::time::Duration;

use crate::config::CallMode;
use crate::error::CallResult;

pub use brokered::BrokeredStrategy;
pub use direct::DirectStrategy;

/// The active transport for one dependency.
#[derive(Debug)]
pub enum Strategy {
    Direct(DirectStrategy),
    Brokered(BrokeredStrategy),
}

impl Strategy {
    pub fn mode(&self) -> CallMode {
        match self {
            Strategy::Direct(_) => CallMode::Direct,
            Strategy::Brokered(_) => CallMode::Brokered,
        }
    }

    /// Perform one attempt.
    pub async fn call(&self, capability: &str, payload: Bytes, deadline: Duration) -> CallResult<Bytes> {
        match self {
            Strategy::Direct(direct) => direct.call(capability, payload, deadline).await,
            Strategy::Brokered(brokered) => brokered.call(capability, payload, deadline).await,
        }
    }
}
