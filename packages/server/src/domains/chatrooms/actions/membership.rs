//! Conversation bootstrap for groups and accepted members.

use anyhow::Result;
use tracing::{debug, info};

use crate::domains::chatrooms::models::{Conversation, Message, NewMessage, JOINED_GROUP_MESSAGE};
use crate::domains::groups::Group;
use crate::domains::join_requests::models::JoinRequest;
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::ServerDeps;

/// Create the conversation of a new group with its owner as first member.
pub async fn open_group_conversation(group: &Group, deps: &ServerDeps) -> Result<Conversation> {
    let conversation = deps
        .store
        .ensure_conversation(&group.event_slug, &group.name)
        .await?;
    deps.store
        .add_participant(conversation.id, &group.owner_email)
        .await?;

    info!(conversation_id = %conversation.id, group = %group.name, "Group conversation ready");
    Ok(conversation)
}

/// Make an accepted requester a member of the group conversation, along with
/// the owner when the group is known, and announce the arrival.
///
/// Safe to call again for the same request: membership is a set and the
/// announcement is only appended when the requester was not yet a member.
pub async fn add_member_to_conversation(
    request: &JoinRequest,
    group: Option<&Group>,
    deps: &ServerDeps,
) -> Result<Option<Message>> {
    let conversation = deps
        .store
        .ensure_conversation(&request.event_slug, &request.group_name)
        .await?;

    if let Some(group) = group {
        deps.store
            .add_participant(conversation.id, &group.owner_email)
            .await?;
    }

    let joined = deps
        .store
        .add_participant(conversation.id, &request.member_email)
        .await?;
    if !joined {
        debug!(conversation_id = %conversation.id, member = %request.member_email, "Already a member");
        return Ok(None);
    }

    let message = deps
        .store
        .append_message(NewMessage {
            conversation_id: conversation.id,
            sender_email: request.member_email.clone(),
            sender_name: display_name(&request.member_email),
            content: JOINED_GROUP_MESSAGE.to_string(),
            system: true,
        })
        .await?;

    info!(conversation_id = %conversation.id, member = %request.member_email, "Member joined conversation");

    let participants = deps.store.participants(conversation.id).await?;
    SideEffectOrchestrator::new(deps)
        .on_message_created(&message, &conversation, &participants)
        .await;

    Ok(Some(message))
}

/// Local part of an email, used when no display name is known.
pub(crate) fn display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_is_local_part() {
        assert_eq!(display_name("lea@x.com"), "lea");
        assert_eq!(display_name("no-at-sign"), "no-at-sign");
    }
}
