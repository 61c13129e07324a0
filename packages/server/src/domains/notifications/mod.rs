//! Notifications domain - side effects fired after a lifecycle transition.

pub mod orchestrator;
pub mod templates;

pub use orchestrator::SideEffectOrchestrator;
