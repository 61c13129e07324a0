//! Create group action - registers a group and opens its conversation

use tracing::{error, info};

use crate::common::LifecycleError;
use crate::domains::chatrooms::actions::open_group_conversation;
use crate::domains::groups::models::{Group, NewGroup};
use crate::domains::join_requests::models::normalize_email;
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::ServerDeps;

/// Create a group for an event.
///
/// The name is unique per event. The conversation is opened with the owner
/// as its first member; a failure there is logged and does not undo the
/// group.
pub async fn create_group(input: NewGroup, deps: &ServerDeps) -> Result<Group, LifecycleError> {
    let input = NewGroup {
        event_slug: input.event_slug.trim().to_string(),
        name: input.name.trim().to_string(),
        owner_email: normalize_email(&input.owner_email),
        owner_name: input.owner_name.trim().to_string(),
        ..input
    };

    if input.event_slug.is_empty() || input.name.is_empty() || input.owner_email.is_empty() {
        return Err(LifecycleError::not_eligible(
            "a group needs an event, a name and an owner",
        ));
    }
    if input.cohort_capacity < 0 || input.price_cents.is_some_and(|p| p < 0) {
        return Err(LifecycleError::not_eligible(
            "capacity and price cannot be negative",
        ));
    }

    let (event_slug, name) = (input.event_slug.clone(), input.name.clone());
    let group = deps.store.create_group(input).await?.ok_or_else(|| {
        LifecycleError::Conflict(format!("a group named {} already exists for {}", name, event_slug))
    })?;

    info!(group_id = %group.id, event = %group.event_slug, name = %group.name, "Group created");

    if let Err(e) = open_group_conversation(&group, deps).await {
        error!(group_id = %group.id, error = %e, "Failed to open group conversation");
    }

    SideEffectOrchestrator::new(deps).on_group_created(&group).await;
    Ok(group)
}
