//! Token revocation registry
//!
//! Remembers which token identifiers must be rejected until they would
//! have expired anyway. The store is injected behind a trait so the
//! in-memory implementation can be swapped for a shared one.
//!
//! The in-memory registry is process-local: revocations do not survive a
//! restart and do not propagate across horizontally scaled instances.
//! That is a known pre-production blocker — a multi-instance deployment
//! needs a shared store with per-entry TTL equal to token expiry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Store of revoked token identifiers.
///
/// Presence implies the token must be rejected regardless of signature
/// validity. Implementations must be safe for concurrent readers and
/// writers.
pub trait RevocationStore: Send + Sync {
    /// Mark a token id revoked until `expires_at` (seconds since the
    /// Unix epoch), after which the entry may be dropped.
    fn revoke(&self, token_id: &str, expires_at: u64);

    /// O(1) membership check.
    fn is_revoked(&self, token_id: &str) -> bool;
}

/// In-memory revocation store backed by a mutex-guarded map.
///
/// Each revocation schedules a fire-and-forget timer that removes the
/// entry at its natural expiry, bounding memory to the set of tokens
/// that are revoked but not yet expired. The timer count is unbounded
/// under adversarial mass revocation.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRevocationStore {
    entries: Arc<RwLock<HashMap<String, u64>>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries whose removal timer has not fired yet.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationStore for InMemoryRevocationStore {
    fn revoke(&self, token_id: &str, expires_at: u64) {
        self.entries
            .write()
            .unwrap()
            .insert(token_id.to_string(), expires_at);

        // An already-expired entry is still inserted so the next check
        // sees it, but no removal timer is scheduled for it.
        let delay = expires_at.saturating_sub(unix_now());
        if delay == 0 {
            return;
        }

        // Removal needs an ambient runtime; without one the entry simply
        // has no timer.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let entries = Arc::clone(&self.entries);
            let token_id = token_id.to_string();
            handle.spawn(async move {
                tokio::time::sleep(Duration::from_secs(delay)).await;
                // Only drop the entry this timer was scheduled for; a
                // re-revocation with a later expiry supersedes it.
                let mut entries = entries.write().unwrap();
                if entries.get(&token_id) == Some(&expires_at) {
                    entries.remove(&token_id);
                    debug!(
                        component = "revocation",
                        operation = "evict",
                        token_id = %token_id,
                        "revocation entry expired"
                    );
                }
            });
        }
    }

    fn is_revoked(&self, token_id: &str) -> bool {
        self.entries.read().unwrap().contains_key(token_id)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoked_immediately_visible() {
        let store = InMemoryRevocationStore::new();
        assert!(!store.is_revoked("jti-1"));

        store.revoke("jti-1", unix_now() + 60);
        assert!(store.is_revoked("jti-1"));
        assert!(!store.is_revoked("jti-2"));
    }

    #[test]
    fn test_past_expiry_still_inserted_without_timer() {
        // No runtime here, and the expiry is already behind us; the entry
        // must still be visible to the next check.
        let store = InMemoryRevocationStore::new();
        store.revoke("jti-old", unix_now().saturating_sub(100));

        assert!(store.is_revoked("jti-old"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_evicted_at_expiry_never_before() {
        let store = InMemoryRevocationStore::new();
        store.revoke("jti-evict", unix_now() + 5);
        assert!(store.is_revoked("jti-evict"));

        // Just short of the expiry the entry must still be present.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(store.is_revoked("jti-evict"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!store.is_revoked("jti-evict"));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mass_revocation_drains() {
        // One fire-and-forget timer per revocation; make sure a burst of
        // them all drain instead of lingering.
        let store = InMemoryRevocationStore::new();
        let expiry = unix_now() + 30;
        for i in 0..1000 {
            store.revoke(&format!("jti-{}", i), expiry);
        }
        assert_eq!(store.len(), 1000);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_revocation_with_later_expiry_survives_first_timer() {
        let store = InMemoryRevocationStore::new();
        let now = unix_now();
        store.revoke("jti-again", now + 2);
        store.revoke("jti-again", now + 60);

        // The first timer fires here but must not clobber the extended
        // entry.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.is_revoked("jti-again"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!store.is_revoked("jti-again"));
    }
}
