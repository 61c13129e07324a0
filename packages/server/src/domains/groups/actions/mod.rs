//! Groups domain actions

mod create_group;

pub use create_group::create_group;
