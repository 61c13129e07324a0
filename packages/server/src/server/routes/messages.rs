use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ConversationId, MessageId};
use crate::domains::chatrooms::{actions, Message};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::Caller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub event_slug: String,
    pub group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageBody {
    pub event_slug: String,
    pub group_name: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_email: String,
    pub sender_name: String,
    pub content: String,
    pub system: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_email: m.sender_email,
            sender_name: m.sender_name,
            content: m.content,
            system: m.system,
            created_at: m.created_at,
        }
    }
}

/// POST /api/conversations/messages - members only
pub async fn post_message_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Json(body): Json<PostMessageBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message = actions::post_message(
        &body.event_slug,
        &body.group_name,
        &caller.email,
        caller.name.as_deref(),
        &body.content,
        &state.deps,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// GET /api/conversations/messages?eventSlug=..&groupName=.. - members only
pub async fn list_messages_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages =
        actions::list_messages(&query.event_slug, &query.group_name, &caller.email, &state.deps)
            .await?;
    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}
