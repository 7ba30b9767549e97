//! Pending-write buffer.
//!
//! Holds credential snapshots that could not reach the durable store. An
//! entry lives only while the store is failing writes for that tenant and is
//! cleared as soon as a durable write succeeds. Later snapshots for the same
//! tenant replace earlier ones, so the buffer never diverges from the most
//! recent credential state.

use std::collections::HashMap;

use crate::connect::CredentialSnapshot;

/// Buffer of snapshots awaiting a reachable store.
#[derive(Default)]
pub struct PendingWrites {
    inner: HashMap<String, CredentialSnapshot>,
}

impl PendingWrites {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a snapshot, replacing any earlier one for the same tenant.
    pub fn put(&mut self, number: &str, snapshot: CredentialSnapshot) {
        self.inner.insert(number.to_string(), snapshot);
    }

    /// Drops the buffered snapshot for a tenant, if any.
    pub fn remove(&mut self, number: &str) {
        self.inner.remove(number);
    }

    /// Takes every buffered entry, leaving the buffer empty.
    ///
    /// Entries that fail to flush are re-buffered by the caller.
    pub fn drain(&mut self) -> Vec<(String, CredentialSnapshot)> {
        self.inner.drain().collect()
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tag: &str) -> CredentialSnapshot {
        CredentialSnapshot::new(serde_json::json!({ "creds": tag }))
    }

    #[test]
    fn test_put_replaces_earlier_snapshot() {
        let mut pending = PendingWrites::new();
        pending.put("111", snapshot("old"));
        pending.put("111", snapshot("new"));
        assert_eq!(pending.len(), 1);

        let drained = pending.drain();
        assert_eq!(drained, vec![("111".to_string(), snapshot("new"))]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_remove_clears_entry() {
        let mut pending = PendingWrites::new();
        pending.put("111", snapshot("x"));
        pending.remove("111");
        assert!(pending.is_empty());
        // Removing an absent entry is a no-op.
        pending.remove("404");
    }
}
