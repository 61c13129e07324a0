//! Submit action - create a pending request, or return the active one

use tracing::info;

use crate::common::LifecycleError;
use crate::domains::join_requests::models::{normalize_email, JoinRequest, NewJoinRequest};
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::ServerDeps;

/// Submit a join request.
///
/// Idempotent per (event, group, requester): while a `pending` or `accepted`
/// request exists for the triple it is returned unchanged and no side effect
/// fires. After a refusal a new request can be submitted.
pub async fn submit(input: NewJoinRequest, deps: &ServerDeps) -> Result<JoinRequest, LifecycleError> {
    let input = NewJoinRequest {
        event_slug: input.event_slug.trim().to_string(),
        group_name: input.group_name.trim().to_string(),
        member_email: normalize_email(&input.member_email),
        ..input
    };

    if input.event_slug.is_empty() || input.group_name.is_empty() || input.member_email.is_empty() {
        return Err(LifecycleError::not_eligible(
            "a join request needs an event, a group and a requester",
        ));
    }
    if input.amount_cents.is_some_and(|a| a < 0) {
        return Err(LifecycleError::not_eligible("amount cannot be negative"));
    }

    let key = input.key();
    let guard = deps.locks.lock(&key).await;
    let result = submit_locked(input, deps).await;
    drop(guard);
    deps.locks.prune();
    deps.dedup.prune();
    result
}

async fn submit_locked(input: NewJoinRequest, deps: &ServerDeps) -> Result<JoinRequest, LifecycleError> {
    let (request, created) = deps.store.create_join_request_if_absent(input).await?;
    if !created {
        info!(request_id = %request.id, status = %request.status, "Active request already exists");
        return Ok(request);
    }

    info!(request_id = %request.id, key = %request.key(), "Join request submitted");
    let group = deps
        .store
        .find_group(&request.event_slug, &request.group_name)
        .await?;
    SideEffectOrchestrator::new(deps)
        .on_request_created(&request, group.as_ref())
        .await;
    Ok(request)
}
