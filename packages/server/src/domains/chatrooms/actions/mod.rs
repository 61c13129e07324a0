//! Chatrooms domain actions
//!
//! Entry points called from the HTTP routes and from the other domains'
//! lifecycle actions. They mutate through the store, fire side effects and
//! return the stored records.

mod membership;
mod messages;

pub use membership::{add_member_to_conversation, open_group_conversation};
pub use messages::{list_messages, post_message};
