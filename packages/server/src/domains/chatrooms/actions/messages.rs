//! Posting to and reading a group conversation.

use tracing::info;

use crate::common::LifecycleError;
use crate::domains::chatrooms::actions::membership::display_name;
use crate::domains::chatrooms::models::{Conversation, Message, NewMessage};
use crate::domains::join_requests::models::normalize_email;
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::ServerDeps;

/// Append a member's message and fan it out.
pub async fn post_message(
    event_slug: &str,
    group_name: &str,
    sender_email: &str,
    sender_name: Option<&str>,
    content: &str,
    deps: &ServerDeps,
) -> Result<Message, LifecycleError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(LifecycleError::not_eligible("message content is empty"));
    }

    let (conversation, participants) =
        member_conversation(event_slug, group_name, sender_email, deps).await?;

    let sender_email = normalize_email(sender_email);
    let sender_name = sender_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| display_name(&sender_email));

    let message = deps
        .store
        .append_message(NewMessage {
            conversation_id: conversation.id,
            sender_email,
            sender_name,
            content: content.to_string(),
            system: false,
        })
        .await?;

    let pushed = SideEffectOrchestrator::new(deps)
        .on_message_created(&message, &conversation, &participants)
        .await;
    info!(message_id = %message.id, conversation_id = %conversation.id, pushed, "Message posted");

    Ok(message)
}

/// The conversation log, oldest first. Members only.
pub async fn list_messages(
    event_slug: &str,
    group_name: &str,
    caller: &str,
    deps: &ServerDeps,
) -> Result<Vec<Message>, LifecycleError> {
    let (conversation, _) = member_conversation(event_slug, group_name, caller, deps).await?;
    Ok(deps.store.messages(conversation.id).await?)
}

async fn member_conversation(
    event_slug: &str,
    group_name: &str,
    email: &str,
    deps: &ServerDeps,
) -> Result<(Conversation, Vec<String>), LifecycleError> {
    let not_member = || LifecycleError::forbidden("only members of this group can access its conversation");

    let conversation = deps
        .store
        .find_conversation(event_slug, group_name)
        .await?
        .ok_or_else(not_member)?;

    let participants = deps.store.participants(conversation.id).await?;
    let email = normalize_email(email);
    if !participants.iter().any(|p| *p == email) {
        return Err(not_member());
    }

    Ok((conversation, participants))
}
