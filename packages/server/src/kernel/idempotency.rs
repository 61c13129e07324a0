//! At-most-once guard for terminal side effects.
//!
//! A scan or an acceptance can reach the orchestrator more than once: the
//! direct API path and the broadcast fallback path both report the same scan.
//! Effects are keyed by what happened and to which request; the first caller
//! to claim a key applies the effects, everyone else gets
//! [`EffectOutcome::DuplicateSuppressed`].
//!
//! Claims are kept for a retention window and pruned after every lifecycle
//! operation. A replay older than the window is applied again; the wallet's
//! unique payout reference still refuses a second credit.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::domains::join_requests::models::RequestKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Created,
    Accepted,
    Refused,
    Scanned,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Created => "created",
            TransitionKind::Accepted => "accepted",
            TransitionKind::Refused => "refused",
            TransitionKind::Scanned => "scanned",
        }
    }
}

/// (event, group, requester, kind, version). The version distinguishes two
/// genuinely different transitions of the same kind on the same key: the
/// request id for decisions, the scan timestamp for scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub request: RequestKey,
    pub kind: TransitionKind,
    pub version: String,
}

impl DedupKey {
    pub fn new(request: RequestKey, kind: TransitionKind, version: impl Into<String>) -> Self {
        Self {
            request,
            kind,
            version: version.into(),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.request, self.kind.as_str(), self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOutcome {
    Applied,
    DuplicateSuppressed,
}

pub const DEFAULT_DEDUP_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    claimed: Arc<DashMap<DedupKey, DateTime<Utc>>>,
    retention: Duration,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_DEDUP_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            claimed: Arc::new(DashMap::new()),
            retention,
        }
    }

    /// Claim `key`. Returns `true` for exactly one caller per key, however
    /// many race for it.
    pub fn check_and_set(&self, key: DedupKey) -> bool {
        match self.claimed.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                true
            }
        }
    }

    pub fn claim(&self, key: DedupKey) -> EffectOutcome {
        if self.check_and_set(key) {
            EffectOutcome::Applied
        } else {
            EffectOutcome::DuplicateSuppressed
        }
    }

    pub fn is_claimed(&self, key: &DedupKey) -> bool {
        self.claimed.contains_key(key)
    }

    /// Drop claims older than the retention window.
    pub fn prune(&self) {
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        // A window too large to represent never expires anything
        if let Some(cutoff) = cutoff {
            self.prune_older_than(cutoff);
        }
    }

    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) {
        self.claimed.retain(|_, claimed_at| *claimed_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

impl Default for IdempotencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(version: &str) -> DedupKey {
        DedupKey::new(
            RequestKey::new("techno-paris", "Crew 1", "a@x.com"),
            TransitionKind::Scanned,
            version,
        )
    }

    #[test]
    fn test_second_claim_is_suppressed() {
        let guard = IdempotencyGuard::new();
        assert_eq!(guard.claim(key("t1")), EffectOutcome::Applied);
        assert_eq!(guard.claim(key("t1")), EffectOutcome::DuplicateSuppressed);
        assert_eq!(guard.claim(key("t2")), EffectOutcome::Applied);
    }

    #[test]
    fn test_old_claims_are_pruned() {
        let guard = IdempotencyGuard::new();
        assert!(guard.check_and_set(key("old")));
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        guard.prune_older_than(cutoff);

        assert!(guard.is_empty());
        // A pruned key can be claimed again
        assert!(guard.check_and_set(key("old")));
    }

    #[test]
    fn test_prune_keeps_claims_within_retention() {
        let guard = IdempotencyGuard::with_retention(Duration::from_secs(60));
        assert!(guard.check_and_set(key("t1")));
        guard.prune();
        assert_eq!(guard.len(), 1);

        let expired = IdempotencyGuard::with_retention(Duration::ZERO);
        assert!(expired.check_and_set(key("t1")));
        std::thread::sleep(Duration::from_millis(5));
        expired.prune();
        assert!(expired.is_empty());
    }

    #[test]
    fn test_concurrent_claims_apply_once() {
        let guard = IdempotencyGuard::new();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let guard = guard.clone();
                    scope.spawn(move || guard.check_and_set(key("same")) as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
