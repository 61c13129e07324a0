//! Server dependencies for domain services (using traits for testability)
//!
//! This module provides the central dependency container used by every
//! lifecycle operation. All external services use trait abstractions to
//! enable testing.

use std::sync::Arc;
use std::time::Duration;

use crate::domains::events::DomainEvent;
use crate::domains::join_requests::models::RequestKey;
use crate::kernel::{
    stream_session::SessionConfig, BaseEmailService, BasePushNotificationService, BaseStore,
    BaseWalletLedger, EventBus, IdempotencyGuard, KeyedLocks, VisibilityRegistry,
};

pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Server dependencies accessible to domain services
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseStore>,
    pub wallet: Arc<dyn BaseWalletLedger>,
    pub email_service: Arc<dyn BaseEmailService>,
    pub push_service: Arc<dyn BasePushNotificationService>,
    /// Process-wide bus feeding every stream session
    pub bus: EventBus<DomainEvent>,
    pub visibility: VisibilityRegistry,
    pub dedup: IdempotencyGuard,
    /// Serializes transitions per (event, group, requester)
    pub locks: KeyedLocks<RequestKey>,
    /// Upper bound for a single email or push call
    pub notification_timeout: Duration,
    pub session_config: SessionConfig,
}

impl ServerDeps {
    /// Create new ServerDeps with default timeouts and fresh in-process state
    pub fn new(
        store: Arc<dyn BaseStore>,
        wallet: Arc<dyn BaseWalletLedger>,
        email_service: Arc<dyn BaseEmailService>,
        push_service: Arc<dyn BasePushNotificationService>,
    ) -> Self {
        Self {
            store,
            wallet,
            email_service,
            push_service,
            bus: EventBus::new(),
            visibility: VisibilityRegistry::default(),
            dedup: IdempotencyGuard::new(),
            locks: KeyedLocks::new(),
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            session_config: SessionConfig::default(),
        }
    }

    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    pub fn with_presence_window(mut self, window: Duration) -> Self {
        self.visibility = VisibilityRegistry::new(window);
        self
    }

    pub fn with_dedup_retention(mut self, retention: Duration) -> Self {
        self.dedup = IdempotencyGuard::with_retention(retention);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.session_config = SessionConfig {
            heartbeat_interval: interval,
        };
        self
    }
}
