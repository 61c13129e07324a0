//! In-process store used when no database is configured, and by tests.
//!
//! One lock guards all tables, so every trait method is atomic the same way a
//! single SQL statement is.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::common::{ConversationId, JoinRequestId, WalletEntryId};
use crate::domains::chatrooms::{message_order, Conversation, Message, NewMessage};
use crate::domains::groups::{Group, NewGroup};
use crate::domains::join_requests::models::{
    normalize_email, JoinRequest, JoinRequestStatus, NewJoinRequest, RequestKey,
};
use crate::kernel::{BaseStore, BaseWalletLedger, WalletCredit, WalletEntry};

#[derive(Default)]
struct Tables {
    groups: HashMap<(String, String), Group>,
    join_requests: HashMap<JoinRequestId, JoinRequest>,
    conversations: HashMap<(String, String), Conversation>,
    participants: HashMap<ConversationId, BTreeSet<String>>,
    messages: HashMap<ConversationId, Vec<Message>>,
    push_tokens: HashMap<String, Vec<String>>,
    wallet: Vec<WalletEntry>,
}

impl Tables {
    fn requests_for<'a>(&'a self, key: &'a RequestKey) -> impl Iterator<Item = &'a JoinRequest> + 'a {
        self.join_requests
            .values()
            .filter(move |r| &r.key() == key)
    }

    fn latest_for(&self, key: &RequestKey, active_only: bool) -> Option<JoinRequest> {
        self.requests_for(key)
            .filter(|r| !active_only || r.status.is_active())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device token for push notifications.
    pub async fn register_push_token(&self, email: &str, token: &str) {
        let mut tables = self.tables.write().await;
        let tokens = tables.push_tokens.entry(normalize_email(email)).or_default();
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }

    /// Number of stored join requests for a key, any status.
    pub async fn count_join_requests(&self, key: &RequestKey) -> usize {
        self.tables.read().await.requests_for(key).count()
    }

    pub async fn wallet_entries(&self) -> Vec<WalletEntry> {
        self.tables.read().await.wallet.clone()
    }
}

#[async_trait]
impl BaseStore for MemoryStore {
    async fn find_group(&self, event_slug: &str, name: &str) -> Result<Option<Group>> {
        let tables = self.tables.read().await;
        Ok(tables
            .groups
            .get(&(event_slug.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_group(&self, group: NewGroup) -> Result<Option<Group>> {
        let mut tables = self.tables.write().await;
        let key = (group.event_slug.clone(), group.name.clone());
        if tables.groups.contains_key(&key) {
            return Ok(None);
        }
        let group = group.into_group();
        tables.groups.insert(key, group.clone());
        Ok(Some(group))
    }

    async fn find_join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>> {
        Ok(self.tables.read().await.join_requests.get(&id).cloned())
    }

    async fn find_active_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>> {
        Ok(self.tables.read().await.latest_for(key, true))
    }

    async fn find_latest_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>> {
        Ok(self.tables.read().await.latest_for(key, false))
    }

    async fn create_join_request_if_absent(
        &self,
        request: NewJoinRequest,
    ) -> Result<(JoinRequest, bool)> {
        let mut tables = self.tables.write().await;
        let key = request.key();
        if let Some(existing) = tables.latest_for(&key, true) {
            return Ok((existing, false));
        }

        let created = NewJoinRequest {
            member_email: key.member_email,
            ..request
        }
        .into_pending();
        tables.join_requests.insert(created.id, created.clone());
        Ok((created, true))
    }

    async fn transition_join_request(
        &self,
        id: JoinRequestId,
        expected: JoinRequestStatus,
        next: JoinRequestStatus,
    ) -> Result<Option<JoinRequest>> {
        let mut tables = self.tables.write().await;
        match tables.join_requests.get_mut(&id) {
            Some(request) if request.status == expected => {
                request.status = next;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_join_request_scanned(
        &self,
        id: JoinRequestId,
        scanned_at: DateTime<Utc>,
    ) -> Result<Option<JoinRequest>> {
        let mut tables = self.tables.write().await;
        match tables.join_requests.get_mut(&id) {
            Some(request)
                if request.status == JoinRequestStatus::Accepted && request.scanned_at.is_none() =>
            {
                request.scanned_at = Some(scanned_at);
                request.payout_released = true;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_conversation(
        &self,
        event_slug: &str,
        group_name: &str,
    ) -> Result<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .get(&(event_slug.to_string(), group_name.to_string()))
            .cloned())
    }

    async fn ensure_conversation(
        &self,
        event_slug: &str,
        group_name: &str,
    ) -> Result<Conversation> {
        let mut tables = self.tables.write().await;
        let conversation = tables
            .conversations
            .entry((event_slug.to_string(), group_name.to_string()))
            .or_insert_with(|| Conversation::new(event_slug, group_name))
            .clone();
        Ok(conversation)
    }

    async fn add_participant(&self, conversation_id: ConversationId, email: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .participants
            .entry(conversation_id)
            .or_default()
            .insert(normalize_email(email)))
    }

    async fn participants(&self, conversation_id: ConversationId) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .participants
            .get(&conversation_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message> {
        let mut tables = self.tables.write().await;
        let message = message.into_message();
        let log = tables.messages.entry(message.conversation_id).or_default();
        log.push(message.clone());
        log.sort_by(message_order);
        Ok(message)
    }

    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_tokens(&self, email: &str) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .push_tokens
            .get(&normalize_email(email))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BaseWalletLedger for MemoryStore {
    async fn credit(&self, credit: WalletCredit) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.wallet.iter().any(|e| e.reference == credit.reference) {
            return Ok(false);
        }
        tables.wallet.push(WalletEntry {
            id: WalletEntryId::new(),
            owner_email: normalize_email(&credit.owner_email),
            amount_cents: credit.amount_cents,
            currency: credit.currency,
            reference: credit.reference,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn balance_cents(&self, owner_email: &str) -> Result<i64> {
        let owner = normalize_email(owner_email);
        let tables = self.tables.read().await;
        Ok(tables
            .wallet
            .iter()
            .filter(|e| e.owner_email == owner)
            .map(|e| e.amount_cents)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(email: &str) -> NewJoinRequest {
        NewJoinRequest {
            event_slug: "techno-paris".into(),
            group_name: "Crew 1".into(),
            member_email: email.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_if_absent_returns_active_request() {
        let store = MemoryStore::new();
        let (first, created) = store
            .create_join_request_if_absent(new_request("a@x.com"))
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .create_join_request_if_absent(new_request("A@x.com"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_refused_request_frees_the_key() {
        let store = MemoryStore::new();
        let (first, _) = store
            .create_join_request_if_absent(new_request("a@x.com"))
            .await
            .unwrap();
        store
            .transition_join_request(first.id, JoinRequestStatus::Pending, JoinRequestStatus::Refused)
            .await
            .unwrap()
            .unwrap();

        let (second, created) = store
            .create_join_request_if_absent(new_request("a@x.com"))
            .await
            .unwrap();
        assert!(created);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let store = MemoryStore::new();
        let (request, _) = store
            .create_join_request_if_absent(new_request("a@x.com"))
            .await
            .unwrap();

        let accepted = store
            .transition_join_request(request.id, JoinRequestStatus::Pending, JoinRequestStatus::Accepted)
            .await
            .unwrap();
        assert!(accepted.is_some());

        let again = store
            .transition_join_request(request.id, JoinRequestStatus::Pending, JoinRequestStatus::Refused)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_mark_scanned_only_once() {
        let store = MemoryStore::new();
        let (request, _) = store
            .create_join_request_if_absent(new_request("a@x.com"))
            .await
            .unwrap();
        assert!(store
            .mark_join_request_scanned(request.id, Utc::now())
            .await
            .unwrap()
            .is_none());

        store
            .transition_join_request(request.id, JoinRequestStatus::Pending, JoinRequestStatus::Accepted)
            .await
            .unwrap();
        let scanned = store
            .mark_join_request_scanned(request.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(scanned.payout_released);
        assert!(store
            .mark_join_request_scanned(request.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wallet_refuses_duplicate_reference() {
        let store = MemoryStore::new();
        let credit = WalletCredit {
            owner_email: "owner@x.com".into(),
            amount_cents: 1500,
            currency: "eur".into(),
            reference: "scan:1".into(),
        };
        assert!(store.credit(credit.clone()).await.unwrap());
        assert!(!store.credit(credit).await.unwrap());
        assert_eq!(store.balance_cents("owner@x.com").await.unwrap(), 1500);
    }
}
