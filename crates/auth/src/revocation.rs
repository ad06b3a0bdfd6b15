//! Revoked token ids (logout).
//!
//! Entries only need to outlive the token they revoke, so each one carries
//! the token's expiry and is dropped once that passes.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait TokenRevocationStore: Send + Sync {
    fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>);
    fn is_revoked(&self, jti: &Uuid, now: DateTime<Utc>) -> bool;
    /// Drop entries whose token has expired; returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Process-local revocation list.
#[derive(Debug, Default)]
pub struct InMemoryRevocationList {
    inner: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl InMemoryRevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenRevocationStore for InMemoryRevocationList {
    fn revoke(&self, jti: Uuid, expires_at: DateTime<Utc>) {
        if let Ok(mut map) = self.inner.write() {
            let now = Utc::now();
            map.retain(|_, exp| *exp > now);
            map.insert(jti, expires_at);
        }
    }

    fn is_revoked(&self, jti: &Uuid, now: DateTime<Utc>) -> bool {
        match self.inner.read() {
            Ok(map) => map.get(jti).is_some_and(|exp| *exp > now),
            // A poisoned list fails closed.
            Err(_) => true,
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut map) = self.inner.write() else {
            return 0;
        };
        let before = map.len();
        map.retain(|_, exp| *exp > now);
        before - map.len()
    }
}
