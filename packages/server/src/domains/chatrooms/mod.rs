//! Chatrooms domain - one conversation per (event, group) and its messages.

pub mod actions;
pub mod models;

pub use models::*;
