use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{ConversationId, MessageId};

/// Content of the announcement appended when a request is accepted.
pub const JOINED_GROUP_MESSAGE: &str = "a rejoint le groupe";

/// Message - immutable once created.
///
/// Ordered by `created_at`, ties broken by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_email: String,
    pub sender_name: String,
    pub content: String,
    /// Generated by the lifecycle rather than typed by a member.
    pub system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_email: String,
    pub sender_name: String,
    pub content: String,
    pub system: bool,
}

impl NewMessage {
    pub fn into_message(self) -> Message {
        Message {
            id: MessageId::new(),
            conversation_id: self.conversation_id,
            sender_email: self.sender_email,
            sender_name: self.sender_name,
            content: self.content,
            system: self.system,
            created_at: Utc::now(),
        }
    }
}

/// Sort key for the conversation log.
pub fn message_order(a: &Message, b: &Message) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

// =============================================================================
// Queries
// =============================================================================

impl Message {
    pub async fn create(new: NewMessage, pool: &PgPool) -> Result<Self> {
        let message = new.into_message();
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_email, sender_name, content, system, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(&message.sender_email)
        .bind(&message.sender_name)
        .bind(&message.content)
        .bind(message.system)
        .bind(message.created_at)
        .fetch_one(pool)
        .await?;
        Ok(message)
    }

    pub async fn find_by_conversation(id: ConversationId, pool: &PgPool) -> Result<Vec<Self>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;
        Ok(messages)
    }
}
