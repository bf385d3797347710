//! Per-entity pass leases.
//!
//! A lease is held for the lifetime of one pass and released when its
//! [`LeaseGuard`] drops. Leases carry an expiry so a lost guard cannot pin
//! an entity forever; an expired lease is evicted on the next acquire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct LeaseEntry {
    token: u64,
    expires_at: u64,
}

/// In-memory lease table shared by the scheduler and its passes.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    entries: Arc<Mutex<HashMap<String, LeaseEntry>>>,
    next_token: Arc<AtomicU64>,
}

impl LeaseTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `entity_id` until `now_ms + ttl_ms`, or `None` if a
    /// live lease is already held.
    pub fn try_acquire(&self, entity_id: &str, now_ms: u64, ttl_ms: u64) -> Option<LeaseGuard> {
        let mut entries = self.entries.lock().ok()?;
        if let Some(existing) = entries.get(entity_id) {
            if existing.expires_at > now_ms {
                return None;
            }
            warn!(
                entity = entity_id,
                expired_at = existing.expires_at,
                "evicting stale pass lease"
            );
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            entity_id.to_owned(),
            LeaseEntry {
                token,
                expires_at: now_ms.saturating_add(ttl_ms),
            },
        );
        Some(LeaseGuard {
            entries: Arc::clone(&self.entries),
            entity_id: entity_id.to_owned(),
            token,
        })
    }

    /// Whether a live lease exists for `entity_id`.
    #[must_use]
    pub fn is_held(&self, entity_id: &str, now_ms: u64) -> bool {
        self.entries
            .lock()
            .map(|e| e.get(entity_id).is_some_and(|l| l.expires_at > now_ms))
            .unwrap_or(false)
    }

    /// Number of leases currently recorded (live or not yet evicted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its lease on drop, unless the lease was already evicted and
/// re-granted to someone else.
#[derive(Debug)]
pub struct LeaseGuard {
    entries: Arc<Mutex<HashMap<String, LeaseEntry>>>,
    entity_id: String,
    token: u64,
}

impl LeaseGuard {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.entries.lock()
            && entries
                .get(&self.entity_id)
                .is_some_and(|e| e.token == self.token)
        {
            entries.remove(&self.entity_id);
        }
    }
}
