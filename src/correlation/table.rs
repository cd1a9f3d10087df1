//! Concurrent correlation table.
//!
//! # Responsibilities
//! - Map correlation ids to pending single-assignment result slots
//! - Hand results from the reply listener to waiting callers
//! - Guarantee every slot is removed when its call ends, however it ends
//! - Reap slots that outlived their deadline plus slack (listener-driven sweep)

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};

use crate::correlation::CorrelationId;
use crate::error::CallError;
use crate::observability::metrics;

/// Value-or-error delivered into a pending slot.
pub type SlotResult = Result<Bytes, CallError>;

/// Errors raised by table registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("Correlation id '{0}' is already registered")]
    Duplicate(CorrelationId),
}

/// A pending result slot.
#[derive(Debug)]
struct PendingSlot {
    tx: oneshot::Sender<SlotResult>,
    created_at: Instant,
    expires_at: Instant,
    capability: String,
}

/// Correlation table for one dependency.
///
/// Shared (via `Arc`) between the calls that register slots and the single
/// reply listener that resolves them.
#[derive(Debug)]
pub struct CorrelationTable {
    dependency: String,
    slots: DashMap<CorrelationId, PendingSlot>,
}

impl CorrelationTable {
    /// Create an empty table for the named dependency.
    pub fn new(dependency: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            slots: DashMap::new(),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Register a pending slot whose caller waits at most `deadline`.
    ///
    /// The returned handle owns the receiving half; dropping it removes the slot.
    pub fn register(
        self: &Arc<Self>,
        id: CorrelationId,
        capability: &str,
        deadline: Duration,
    ) -> Result<PendingHandle, TableError> {
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();

        match self.slots.entry(id.clone()) {
            Entry::Occupied(_) => return Err(TableError::Duplicate(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(PendingSlot {
                    tx,
                    created_at: now,
                    expires_at: now + deadline,
                    capability: capability.to_string(),
                });
            }
        }
        metrics::record_pending(&self.dependency, self.slots.len());

        Ok(PendingHandle {
            id,
            table: self.clone(),
            rx,
        })
    }

    /// Resolve a pending slot with a result.
    ///
    /// Returns `false` if the id is unknown (late, duplicate, or never ours)
    /// or if its caller has already gone away. Other slots are never touched.
    pub fn resolve(&self, id: &CorrelationId, result: SlotResult) -> bool {
        let Some((_, slot)) = self.slots.remove(id) else {
            tracing::warn!(
                dependency = %self.dependency,
                correlation_id = %id,
                "Dropping reply for unknown correlation id"
            );
            metrics::record_unknown_reply(&self.dependency);
            return false;
        };
        metrics::record_pending(&self.dependency, self.slots.len());

        let age = slot.created_at.elapsed();
        if slot.tx.send(result).is_err() {
            tracing::debug!(
                dependency = %self.dependency,
                correlation_id = %id,
                capability = %slot.capability,
                "Caller gone before reply could be delivered"
            );
            return false;
        }

        tracing::debug!(
            dependency = %self.dependency,
            correlation_id = %id,
            capability = %slot.capability,
            age_ms = age.as_millis() as u64,
            "Pending slot resolved"
        );
        true
    }

    /// Remove a slot without resolving it. Returns whether it was present.
    pub fn remove(&self, id: &CorrelationId) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            metrics::record_pending(&self.dependency, self.slots.len());
        }
        removed
    }

    /// Release every slot more than `slack` past its deadline, failing its
    /// caller with `Cancelled`.
    ///
    /// Returns the number of slots reaped.
    pub fn reap_expired(&self, slack: Duration) -> usize {
        let now = Instant::now();
        self.release_where(|slot| now > slot.expires_at + slack)
    }

    /// Release every slot, failing callers with `Cancelled`. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        self.release_where(|_| true)
    }

    fn release_where(&self, expired: impl Fn(&PendingSlot) -> bool) -> usize {
        let candidates: Vec<CorrelationId> = self
            .slots
            .iter()
            .filter(|entry| expired(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut reaped = 0;
        for id in candidates {
            if let Some((_, slot)) = self.slots.remove_if(&id, |_, slot| expired(slot)) {
                tracing::warn!(
                    dependency = %self.dependency,
                    correlation_id = %id,
                    capability = %slot.capability,
                    age_ms = slot.created_at.elapsed().as_millis() as u64,
                    "Releasing pending slot"
                );
                let _ = slot.tx.send(Err(CallError::Cancelled));
                reaped += 1;
            }
        }

        if reaped > 0 {
            metrics::record_pending(&self.dependency, self.slots.len());
        }
        reaped
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Caller-side ownership of a registered slot.
///
/// Removes its slot on drop, so success, error, timeout, and cancellation
/// (dropping the call future) all release the table entry.
#[derive(Debug)]
pub struct PendingHandle {
    id: CorrelationId,
    table: Arc<CorrelationTable>,
    rx: oneshot::Receiver<SlotResult>,
}

impl PendingHandle {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Wait for the slot to be resolved, at most `deadline`.
    pub async fn wait(&mut self, deadline: Duration) -> SlotResult {
        match timeout(deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: slot was released underneath us.
            Ok(Err(_)) => Err(CallError::Cancelled),
            Err(_) => Err(CallError::Timeout(deadline)),
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn table() -> Arc<CorrelationTable> {
        Arc::new(CorrelationTable::new("customer"))
    }

    #[tokio::test]
    async fn test_resolve_wakes_waiter() {
        let table = table();
        let mut handle = table.register("id-1".into(), "get-customer", SECOND).unwrap();
        assert_eq!(table.len(), 1);

        assert!(table.resolve(&"id-1".into(), Ok(Bytes::from_static(b"{\"id\":1}"))));
        let result = handle.wait(Duration::from_secs(1)).await;
        assert_eq!(result.unwrap(), Bytes::from_static(b"{\"id\":1}"));

        drop(handle);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let table = table();
        let _a = table.register("a".into(), "get-customer", SECOND).unwrap();
        let _b = table.register("b".into(), "get-customer", SECOND).unwrap();

        assert!(!table.resolve(&"zzz".into(), Ok(Bytes::new())));
        assert_eq!(table.len(), 2);
        assert!(table.contains(&"a".into()));
        assert!(table.contains(&"b".into()));
    }

    #[tokio::test]
    async fn test_duplicate_reply_resolves_once() {
        let table = table();
        let mut handle = table.register("dup".into(), "get-customer", SECOND).unwrap();

        assert!(table.resolve(&"dup".into(), Ok(Bytes::from_static(b"first"))));
        assert!(!table.resolve(&"dup".into(), Ok(Bytes::from_static(b"second"))));

        let result = handle.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(&result[..], b"first");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let table = table();
        let _handle = table.register("same".into(), "get-customer", SECOND).unwrap();
        let err = table.register("same".into(), "get-customer", SECOND).unwrap_err();
        assert_eq!(err, TableError::Duplicate("same".into()));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_drop_removes() {
        let table = table();
        let mut handle = table.register("slow".into(), "get-customer", SECOND).unwrap();

        let result = handle.wait(Duration::from_millis(500)).await;
        assert_eq!(result, Err(CallError::Timeout(Duration::from_millis(500))));

        drop(handle);
        assert!(table.is_empty());
        assert!(!table.resolve(&"slow".into(), Ok(Bytes::new())));
    }

    #[test]
    fn test_dropped_handle_releases_slot() {
        let table = table();
        let handle = table.register("cancelled".into(), "get-customer", SECOND).unwrap();
        drop(handle);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_cancels_only_expired() {
        let table = table();
        let mut old = table.register("old".into(), "get-customer", SECOND).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let _fresh = table.register("fresh".into(), "get-customer", SECOND).unwrap();
        let _patient = table.register("patient".into(), "get-customer", Duration::from_secs(60)).unwrap();

        assert_eq!(table.reap_expired(Duration::from_secs(2)), 1);
        assert!(table.contains(&"patient".into()));
        assert!(!table.contains(&"old".into()));
        assert!(table.contains(&"fresh".into()));
        assert_eq!(old.wait(Duration::from_secs(1)).await, Err(CallError::Cancelled));
    }
}
