//! Groups domain - a group of members going to one event together.

pub mod actions;
pub mod models;

pub use models::*;
