//! Domain events published on the bus and streamed to clients.
//!
//! Every event carries a full snapshot of the entity, never a diff, so a
//! client can render it without querying back. Field names are part of the
//! wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ConversationId, JoinRequestId, MessageId};
use crate::domains::chatrooms::Message;
use crate::domains::groups::Group;
use crate::domains::join_requests::models::{JoinRequest, JoinRequestStatus};
use crate::kernel::event_bus::BusEvent;

pub const JOIN_REQUEST_CREATED: &str = "joinRequest:created";
pub const JOIN_REQUEST_UPDATED: &str = "joinRequest:updated";
pub const GROUP_CREATED: &str = "group:created";
pub const MESSAGE_CREATED: &str = "message:created";

/// Every channel a stream session listens on.
pub const ALL_CHANNELS: [&str; 4] = [
    JOIN_REQUEST_CREATED,
    JOIN_REQUEST_UPDATED,
    GROUP_CREATED,
    MESSAGE_CREATED,
];

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    JoinRequestCreated(JoinRequestPayload),
    JoinRequestUpdated(JoinRequestPayload),
    GroupCreated(GroupPayload),
    MessageCreated(MessagePayload),
}

impl BusEvent for DomainEvent {
    fn channel(&self) -> &'static str {
        match self {
            DomainEvent::JoinRequestCreated(_) => JOIN_REQUEST_CREATED,
            DomainEvent::JoinRequestUpdated(_) => JOIN_REQUEST_UPDATED,
            DomainEvent::GroupCreated(_) => GROUP_CREATED,
            DomainEvent::MessageCreated(_) => MESSAGE_CREATED,
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            DomainEvent::JoinRequestCreated(p) | DomainEvent::JoinRequestUpdated(p) => {
                serde_json::to_value(p)
            }
            DomainEvent::GroupCreated(p) => serde_json::to_value(p),
            DomainEvent::MessageCreated(p) => serde_json::to_value(p),
        }
    }
}

impl DomainEvent {
    pub fn join_request_created(request: &JoinRequest) -> Self {
        DomainEvent::JoinRequestCreated(request.into())
    }

    pub fn join_request_updated(request: &JoinRequest) -> Self {
        DomainEvent::JoinRequestUpdated(request.into())
    }

    pub fn group_created(group: &Group) -> Self {
        DomainEvent::GroupCreated(group.into())
    }

    pub fn message_created(message: &Message) -> Self {
        DomainEvent::MessageCreated(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestPayload {
    pub id: JoinRequestId,
    pub event_slug: String,
    pub group_name: String,
    pub member_email: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub payout_released: bool,
}

impl From<&JoinRequest> for JoinRequestPayload {
    fn from(r: &JoinRequest) -> Self {
        Self {
            id: r.id,
            event_slug: r.event_slug.clone(),
            group_name: r.group_name.clone(),
            member_email: r.member_email.clone(),
            amount_cents: r.amount_cents,
            currency: r.currency.clone(),
            method: r.method.clone(),
            status: r.status,
            created_at: r.created_at,
            scanned_at: r.scanned_at,
            payout_released: r.payout_released,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub event_slug: String,
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
}

impl From<&Group> for GroupPayload {
    fn from(g: &Group) -> Self {
        Self {
            event_slug: g.event_slug.clone(),
            name: g.name.clone(),
            owner_email: g.owner_email.clone(),
            owner_name: g.owner_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_email: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePayload {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_email: m.sender_email.clone(),
            sender_name: m.sender_name.clone(),
            content: m.content.clone(),
            created_at: m.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::join_requests::models::NewJoinRequest;

    #[test]
    fn test_join_request_payload_uses_wire_field_names() {
        let request = NewJoinRequest {
            event_slug: "techno-paris".into(),
            group_name: "Crew 1".into(),
            member_email: "a@x.com".into(),
            amount_cents: Some(1500),
            currency: Some("eur".into()),
            method: Some("card".into()),
        }
        .into_pending();

        let event = DomainEvent::join_request_created(&request);
        assert_eq!(event.channel(), JOIN_REQUEST_CREATED);

        let payload = event.payload().unwrap();
        let keys: Vec<&str> = payload.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for key in [
            "id",
            "eventSlug",
            "groupName",
            "memberEmail",
            "amountCents",
            "currency",
            "method",
            "status",
            "createdAt",
            "scannedAt",
            "payoutReleased",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(payload["status"], "pending");
        assert!(payload["scannedAt"].is_null());
        assert_eq!(payload["payoutReleased"], false);
    }
}
