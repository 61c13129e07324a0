//! Typed ID definitions for the entities the core touches.
//!
//! ```rust
//! use crew_core::common::{ConversationId, JoinRequestId};
//!
//! let request_id = JoinRequestId::new();
//! let conversation_id = ConversationId::new();
//! // let wrong: ConversationId = request_id; // compile error
//! ```

pub use super::id::{Id, V7};

/// Marker type for JoinRequest entities.
pub struct JoinRequestEntity;

/// Marker type for Group entities.
pub struct GroupEntity;

/// Marker type for Conversation entities.
pub struct ConversationEntity;

/// Marker type for Message entities.
pub struct MessageEntity;

/// Marker type for wallet ledger entries.
pub struct WalletEntryEntity;

/// Typed ID for join requests. V7, so ids sort by creation time.
pub type JoinRequestId = Id<JoinRequestEntity>;

pub type GroupId = Id<GroupEntity>;

pub type ConversationId = Id<ConversationEntity>;

pub type MessageId = Id<MessageEntity>;

pub type WalletEntryId = Id<WalletEntryEntity>;
