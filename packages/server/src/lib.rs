// Crew Night - realtime core
//
// Join-request lifecycle, side-effect orchestration and the in-process event
// bus that feeds every live stream session.
//
// Domain logic lives in domains/*, infrastructure in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
