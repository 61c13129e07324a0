//! Join request lifecycle actions
//!
//! Every action takes the per-key lock for its (event, group, requester)
//! triple, re-reads the record under it and applies the transition with a
//! compare-and-swap in the store. Side effects run after the store accepted
//! the transition, while the lock is still held, so the events of one key are
//! published in transition order.

mod decide;
mod scan;
mod submit;

pub use decide::decide;
pub use scan::{acknowledge_scan, scan, ScanResult};
pub use submit::submit;

use crate::common::LifecycleError;
use crate::domains::groups::Group;

/// Owner-only check.
pub(crate) fn ensure_owner(
    group: &Group,
    caller: &str,
    denied: impl FnOnce() -> LifecycleError,
) -> Result<(), LifecycleError> {
    if group.is_owned_by(caller) {
        Ok(())
    } else {
        Err(denied())
    }
}
