//! Decide action - the owner accepts or refuses a pending request

use tracing::{error, info, warn};

use crate::common::{JoinRequestId, LifecycleError};
use crate::domains::chatrooms::actions::add_member_to_conversation;
use crate::domains::join_requests::actions::ensure_owner;
use crate::domains::join_requests::models::{Decision, JoinRequest, JoinRequestStatus};
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::ServerDeps;

/// Accept or refuse a request. Only `pending` requests can be decided.
///
/// On acceptance the requester joins the group conversation with the owner
/// and a system message announces it.
pub async fn decide(
    id: JoinRequestId,
    decision: Decision,
    caller: &str,
    deps: &ServerDeps,
) -> Result<JoinRequest, LifecycleError> {
    let request = deps
        .store
        .find_join_request(id)
        .await?
        .ok_or(LifecycleError::NotFound(id))?;

    let key = request.key();
    let guard = deps.locks.lock(&key).await;
    let result = decide_locked(id, decision, caller, deps).await;
    drop(guard);
    deps.locks.prune();
    deps.dedup.prune();
    result
}

async fn decide_locked(
    id: JoinRequestId,
    decision: Decision,
    caller: &str,
    deps: &ServerDeps,
) -> Result<JoinRequest, LifecycleError> {
    let request = deps
        .store
        .find_join_request(id)
        .await?
        .ok_or(LifecycleError::NotFound(id))?;

    // Without the group there is no owner who could decide.
    let Some(group) = deps
        .store
        .find_group(&request.event_slug, &request.group_name)
        .await?
    else {
        warn!(request_id = %id, group = %request.group_name, "Group not found, decision refused");
        return Err(LifecycleError::forbidden(
            "the group of this request does not exist",
        ));
    };
    ensure_owner(&group, caller, || {
        LifecycleError::forbidden("only the group owner may decide on this request")
    })?;

    let next = request.check_decision(decision)?;
    let updated = match deps
        .store
        .transition_join_request(id, JoinRequestStatus::Pending, next)
        .await?
    {
        Some(updated) => updated,
        None => {
            // Changed by another writer between our read and the swap.
            let current = deps
                .store
                .find_join_request(id)
                .await?
                .ok_or(LifecycleError::NotFound(id))?;
            return Err(LifecycleError::InvalidTransition {
                id,
                from: current.status,
                to: next,
            });
        }
    };

    info!(request_id = %id, status = %updated.status, "Join request decided");

    if decision == Decision::Accepted {
        if let Err(e) = add_member_to_conversation(&updated, Some(&group), deps).await {
            error!(request_id = %id, error = %e, "Failed to add member to conversation");
        }
    }

    SideEffectOrchestrator::new(deps)
        .on_request_decided(&updated, decision)
        .await;
    Ok(updated)
}
