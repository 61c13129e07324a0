//! Postgres-backed store. Queries live on the models; this adapter only wires
//! them to the store traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{ConversationId, JoinRequestId, WalletEntryId};
use crate::domains::chatrooms::{Conversation, Message, NewMessage};
use crate::domains::groups::{Group, NewGroup};
use crate::domains::join_requests::models::{
    normalize_email, JoinRequest, JoinRequestStatus, NewJoinRequest, RequestKey,
};
use crate::kernel::{BaseStore, BaseWalletLedger, WalletCredit};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseStore for PostgresStore {
    async fn find_group(&self, event_slug: &str, name: &str) -> Result<Option<Group>> {
        Group::find_by_name(event_slug, name, &self.pool).await
    }

    async fn create_group(&self, group: NewGroup) -> Result<Option<Group>> {
        Group::create(group, &self.pool).await
    }

    async fn find_join_request(&self, id: JoinRequestId) -> Result<Option<JoinRequest>> {
        JoinRequest::find_by_id(id, &self.pool).await
    }

    async fn find_active_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>> {
        JoinRequest::find_active(key, &self.pool).await
    }

    async fn find_latest_join_request(&self, key: &RequestKey) -> Result<Option<JoinRequest>> {
        JoinRequest::find_latest(key, &self.pool).await
    }

    async fn create_join_request_if_absent(
        &self,
        request: NewJoinRequest,
    ) -> Result<(JoinRequest, bool)> {
        JoinRequest::create_if_absent(request, &self.pool).await
    }

    async fn transition_join_request(
        &self,
        id: JoinRequestId,
        expected: JoinRequestStatus,
        next: JoinRequestStatus,
    ) -> Result<Option<JoinRequest>> {
        JoinRequest::transition_status(id, expected, next, &self.pool).await
    }

    async fn mark_join_request_scanned(
        &self,
        id: JoinRequestId,
        scanned_at: DateTime<Utc>,
    ) -> Result<Option<JoinRequest>> {
        JoinRequest::mark_scanned(id, scanned_at, &self.pool).await
    }

    async fn find_conversation(
        &self,
        event_slug: &str,
        group_name: &str,
    ) -> Result<Option<Conversation>> {
        Conversation::find_by_group(event_slug, group_name, &self.pool).await
    }

    async fn ensure_conversation(
        &self,
        event_slug: &str,
        group_name: &str,
    ) -> Result<Conversation> {
        Conversation::ensure(event_slug, group_name, &self.pool).await
    }

    async fn add_participant(&self, conversation_id: ConversationId, email: &str) -> Result<bool> {
        Conversation::add_participant(conversation_id, &normalize_email(email), &self.pool).await
    }

    async fn participants(&self, conversation_id: ConversationId) -> Result<Vec<String>> {
        Conversation::participants(conversation_id, &self.pool).await
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message> {
        Message::create(message, &self.pool).await
    }

    async fn messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        Message::find_by_conversation(conversation_id, &self.pool).await
    }

    async fn push_tokens(&self, email: &str) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT token FROM push_tokens WHERE email = $1 ORDER BY created_at",
        )
        .bind(normalize_email(email))
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }
}

#[async_trait]
impl BaseWalletLedger for PostgresStore {
    async fn credit(&self, credit: WalletCredit) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallet_entries (id, owner_email, amount_cents, currency, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(WalletEntryId::new())
        .bind(normalize_email(&credit.owner_email))
        .bind(credit.amount_cents)
        .bind(&credit.currency)
        .bind(&credit.reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn balance_cents(&self, owner_email: &str) -> Result<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM wallet_entries WHERE owner_email = $1",
        )
        .bind(normalize_email(owner_email))
        .fetch_one(&self.pool)
        .await?;
        Ok(balance)
    }
}
