// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Lifecycle rules live in domains/join_requests; these traits only move data
// in and out of external collaborators.
//
// Naming convention: Base* for trait names (e.g., BaseStore, BaseEmailService)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ConversationId, JoinRequestId, WalletEntryId};
use crate::domains::chatrooms::{Conversation, Message, NewMessage};
use crate::domains::groups::{Group, NewGroup};
use crate::domains::join_requests::models::{
    JoinRequest, JoinRequestStatus, NewJoinRequest, RequestKey,
};

// =============================================================================
// Durable Store Trait (Infrastructure)
// =============================================================================

/// The durable store is the single source of truth. Every mutating call is
/// atomic on its own; nothing here spans entity types.
#[async_trait]
pub trait BaseStore: Send + Sync {
    // Groups
    async fn find_group(&self, event_slug: &str, name: &str) -> Result<Option<Group>>;

    /// Returns `None` when the name is already taken for the event.
    async fn create_group(&self, group: NewGroup) -> Result<Option<Group>>;

    // Join requests
    async fn find_join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>>;

    async fn find_active_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>>;

    /// Most recent request for the key, whatever its status.
    async fn find_latest_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>>;

    /// Create a `pending` request unless an active one holds the key.
    /// Returns the stored request and whether it was created by this call.
    async fn create_join_request_if_absent(
        &self,
        request: NewJoinRequest,
    ) -> Result<(JoinRequest, bool)>;

    /// Compare-and-swap on status. `None` if the row was not in `expected`.
    async fn transition_join_request(
        &self,
        id: JoinRequestId,
        expected: JoinRequestStatus,
        next: JoinRequestStatus,
    ) -> Result<Option<JoinRequest>>;

    /// Set `scanned_at` and `payout_released` together, only on an accepted,
    /// never-scanned request. `None` otherwise.
    async fn mark_join_request_scanned(
        &self,
        id: JoinRequestId,
        scanned_at: DateTime<Utc>,
    ) -> Result<Option<JoinRequest>>;

    // Conversations
    async fn find_conversation(
        &self,
        event_slug: &str,
        group_name: &str,
    ) -> Result<Option<Conversation>>;

    /// Create-if-absent, then read back. Safe to retry.
    async fn ensure_conversation(&self, event_slug: &str, group_name: &str)
        -> Result<Conversation>;

    /// Returns true if the email was not a participant before.
    async fn add_participant(&self, conversation_id: ConversationId, email: &str) -> Result<bool>;

    async fn participants(&self, conversation_id: ConversationId) -> Result<Vec<String>>;

    async fn append_message(&self, message: NewMessage) -> Result<Message>;

    /// Ordered by creation time, ties broken by id.
    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>>;

    // Devices
    async fn push_tokens(&self, email: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Wallet Ledger Trait (Infrastructure)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletCredit {
    pub owner_email: String,
    pub amount_cents: i64,
    pub currency: String,
    /// Unique per credited event; the ledger refuses a second entry with the
    /// same reference.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: WalletEntryId,
    pub owner_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BaseWalletLedger: Send + Sync {
    /// Append a credit. Returns `false` if the reference was already credited.
    async fn credit(&self, credit: WalletCredit) -> Result<bool>;

    async fn balance_cents(&self, owner_email: &str) -> Result<i64>;
}

// =============================================================================
// Email Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseEmailService: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

// =============================================================================
// Push Notification Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BasePushNotificationService: Send + Sync {
    /// Send a push notification to every device registered for `email`.
    async fn send_notification(
        &self,
        email: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<()>;
}
