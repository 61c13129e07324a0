//! Presence tracking used to skip redundant push notifications.
//!
//! Purely an optimization signal: a stale or empty registry only means a push
//! that was not needed, or one that was skipped. Lifecycle decisions never
//! read it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domains::join_requests::models::normalize_email;

#[derive(Debug, Clone)]
pub struct VisibilityRegistry {
    last_seen: std::sync::Arc<DashMap<String, DateTime<Utc>>>,
    window: Duration,
}

impl VisibilityRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen: std::sync::Arc::new(DashMap::new()),
            window,
        }
    }

    pub fn set_active(&self, identity: &str) {
        self.set_active_at(identity, Utc::now());
    }

    pub fn set_active_at(&self, identity: &str, at: DateTime<Utc>) {
        self.last_seen.insert(normalize_email(identity), at);
    }

    pub fn set_inactive(&self, identity: &str) {
        self.last_seen.remove(&normalize_email(identity));
    }

    pub fn is_active(&self, identity: &str) -> bool {
        self.is_active_at(identity, Utc::now())
    }

    /// Entries are never swept; expiry is evaluated here, on read.
    pub fn is_active_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        let Some(seen) = self.last_seen.get(&normalize_email(identity)).map(|e| *e) else {
            return false;
        };
        match (now - seen).to_std() {
            Ok(elapsed) => elapsed <= self.window,
            // Seen "in the future" (clock skew between writers): treat as fresh.
            Err(_) => true,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for VisibilityRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_within_window() {
        let registry = VisibilityRegistry::default();
        let now = Utc::now();
        registry.set_active_at("a@x.com", now);

        assert!(registry.is_active_at("a@x.com", now + chrono::Duration::seconds(29)));
        assert!(registry.is_active_at("A@X.com", now));
        assert!(!registry.is_active_at("b@x.com", now));
    }

    #[test]
    fn test_entries_expire_lazily() {
        let registry = VisibilityRegistry::default();
        let now = Utc::now();
        registry.set_active_at("a@x.com", now);

        assert!(!registry.is_active_at("a@x.com", now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_set_inactive_removes_immediately() {
        let registry = VisibilityRegistry::default();
        registry.set_active("a@x.com");
        registry.set_inactive("a@x.com");
        assert!(!registry.is_active("a@x.com"));
    }
}
