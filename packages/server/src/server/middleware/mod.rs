// HTTP middleware
pub mod identity;

pub use identity::*;
