use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::ConversationId;

/// Conversation - the chat thread of a group, unique per (event, group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: ConversationId,
    pub event_slug: String,
    pub group_name: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(event_slug: &str, group_name: &str) -> Self {
        Self {
            id: ConversationId::new(),
            event_slug: event_slug.to_string(),
            group_name: group_name.to_string(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

impl Conversation {
    pub async fn find_by_group(
        event_slug: &str,
        group_name: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE event_slug = $1 AND group_name = $2",
        )
        .bind(event_slug)
        .bind(group_name)
        .fetch_optional(pool)
        .await?;
        Ok(conversation)
    }

    /// Create the conversation if it does not exist yet, then read it back.
    /// Safe to call concurrently and to retry.
    pub async fn ensure(event_slug: &str, group_name: &str, pool: &PgPool) -> Result<Self> {
        let fresh = Conversation::new(event_slug, group_name);
        sqlx::query(
            r#"
            INSERT INTO conversations (id, event_slug, group_name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_slug, group_name) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(&fresh.event_slug)
        .bind(&fresh.group_name)
        .bind(fresh.created_at)
        .execute(pool)
        .await?;

        Self::find_by_group(event_slug, group_name, pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Conversation {}/{} vanished after upsert", event_slug, group_name))
    }

    /// Add a participant. Returns true if they were not a member before.
    pub async fn add_participant(id: ConversationId, email: &str, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, email)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id)
        .bind(email)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn participants(id: ConversationId, pool: &PgPool) -> Result<Vec<String>> {
        let emails = sqlx::query_scalar::<_, String>(
            "SELECT email FROM conversation_participants WHERE conversation_id = $1 ORDER BY email",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(emails)
    }
}
