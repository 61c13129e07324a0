//! Join requests domain - a member's application to a group, from submission
//! through the owner's decision to the door scan that releases the payout.

pub mod actions;
pub mod models;

pub use actions::ScanResult;
pub use models::*;
