// Domain modules

pub mod chatrooms;
pub mod events;
pub mod groups;
pub mod join_requests;
pub mod notifications;
