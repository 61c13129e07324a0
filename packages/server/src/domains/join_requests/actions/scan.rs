//! Scan actions - the door scan of an accepted member, and the fallback
//! acknowledgement of a scan reported over the broadcast path

use chrono::Utc;
use tracing::{info, warn};

use crate::common::{JoinRequestId, LifecycleError};
use crate::domains::groups::Group;
use crate::domains::join_requests::actions::ensure_owner;
use crate::domains::join_requests::models::{
    normalize_email, JoinRequest, RequestKey, ScanEligibility,
};
use crate::domains::notifications::SideEffectOrchestrator;
use crate::kernel::{EffectOutcome, ServerDeps};

/// Outcome of a scan. A repeated scan is a success carrying the stored
/// record and [`EffectOutcome::DuplicateSuppressed`].
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub request: JoinRequest,
    pub outcome: EffectOutcome,
}

impl ScanResult {
    pub fn is_first_scan(&self) -> bool {
        self.outcome == EffectOutcome::Applied
    }
}

/// Scan a member at the door.
///
/// Only an `accepted` request can be scanned. The first scan stamps
/// `scanned_at`, releases the payout and credits the owner; any later scan
/// returns the stored record and applies nothing.
pub async fn scan(
    event_slug: &str,
    group_name: &str,
    member_email: &str,
    caller: &str,
    deps: &ServerDeps,
) -> Result<ScanResult, LifecycleError> {
    let key = RequestKey::new(event_slug.trim(), group_name.trim(), member_email);
    let guard = deps.locks.lock(&key).await;
    let result = scan_locked(&key, caller, deps).await;
    drop(guard);
    deps.locks.prune();
    deps.dedup.prune();
    result
}

async fn scan_locked(
    key: &RequestKey,
    caller: &str,
    deps: &ServerDeps,
) -> Result<ScanResult, LifecycleError> {
    // No group, no owner to credit: nothing may be released.
    let Some(group) = deps
        .store
        .find_group(&key.event_slug, &key.group_name)
        .await?
    else {
        warn!(key = %key, "Group not found, scan refused");
        return Err(LifecycleError::NotEligible(format!(
            "group {} not found for {}",
            key.group_name, key.event_slug
        )));
    };
    ensure_owner(&group, caller, || {
        LifecycleError::not_eligible("only the group owner may scan this code")
    })?;

    let request = match deps.store.find_active_join_request(key).await? {
        Some(request) => request,
        None => {
            let reason = match deps.store.find_latest_join_request(key).await? {
                Some(latest) => format!("the join request for {} was {}", key.member_email, latest.status),
                None => format!("no join request from {} for {}", key.member_email, key.group_name),
            };
            return Err(LifecycleError::NotEligible(reason));
        }
    };

    match request.scan_eligibility() {
        ScanEligibility::NotAccepted(status) => Err(LifecycleError::NotEligible(format!(
            "the join request for {} is {}, not accepted",
            key.member_email, status
        ))),
        ScanEligibility::AlreadyScanned => {
            info!(request_id = %request.id, "Already scanned, nothing applied");
            Ok(ScanResult {
                request,
                outcome: EffectOutcome::DuplicateSuppressed,
            })
        }
        ScanEligibility::Release => release(request, &group, deps).await,
    }
}

async fn release(
    request: JoinRequest,
    group: &Group,
    deps: &ServerDeps,
) -> Result<ScanResult, LifecycleError> {
    match deps
        .store
        .mark_join_request_scanned(request.id, Utc::now())
        .await?
    {
        Some(scanned) => {
            info!(request_id = %scanned.id, "Scanned, payout released");
            let outcome = SideEffectOrchestrator::new(deps)
                .on_request_scanned(&scanned, group)
                .await;
            Ok(ScanResult {
                request: scanned,
                outcome,
            })
        }
        None => {
            // Another writer scanned it first.
            let current = deps
                .store
                .find_join_request(request.id)
                .await?
                .ok_or(LifecycleError::NotFound(request.id))?;
            match current.scan_eligibility() {
                ScanEligibility::AlreadyScanned => Ok(ScanResult {
                    request: current,
                    outcome: EffectOutcome::DuplicateSuppressed,
                }),
                ScanEligibility::NotAccepted(status) => Err(LifecycleError::NotEligible(format!(
                    "the join request is {}, not accepted",
                    status
                ))),
                ScanEligibility::Release => Err(LifecycleError::Store(anyhow::anyhow!(
                    "store refused to mark request {} as scanned",
                    request.id
                ))),
            }
        }
    }
}

/// Second delivery path for a scan: a client that saw the scan broadcast
/// reports it back. Re-reads the stored record and replays the scan effects
/// through the dedup guard, so nothing already applied is applied again.
///
/// Allowed for the group owner and for the scanned member.
pub async fn acknowledge_scan(
    id: JoinRequestId,
    caller: &str,
    deps: &ServerDeps,
) -> Result<ScanResult, LifecycleError> {
    let request = deps
        .store
        .find_join_request(id)
        .await?
        .ok_or(LifecycleError::NotFound(id))?;

    let key = request.key();
    let guard = deps.locks.lock(&key).await;
    let result = acknowledge_locked(id, caller, deps).await;
    drop(guard);
    deps.locks.prune();
    deps.dedup.prune();
    result
}

async fn acknowledge_locked(
    id: JoinRequestId,
    caller: &str,
    deps: &ServerDeps,
) -> Result<ScanResult, LifecycleError> {
    let request = deps
        .store
        .find_join_request(id)
        .await?
        .ok_or(LifecycleError::NotFound(id))?;
    let Some(group) = deps
        .store
        .find_group(&request.event_slug, &request.group_name)
        .await?
    else {
        warn!(request_id = %id, group = %request.group_name, "Group not found, scan not acknowledged");
        return Err(LifecycleError::not_eligible(
            "the group of this request does not exist",
        ));
    };

    if request.key().member_email != normalize_email(caller) {
        ensure_owner(&group, caller, || {
            LifecycleError::forbidden("only the group owner or the member may acknowledge this scan")
        })?;
    }

    match request.scan_eligibility() {
        ScanEligibility::AlreadyScanned => {
            let outcome = SideEffectOrchestrator::new(deps)
                .on_request_scanned(&request, &group)
                .await;
            info!(request_id = %id, outcome = ?outcome, "Scan acknowledged");
            Ok(ScanResult { request, outcome })
        }
        ScanEligibility::Release => Err(LifecycleError::not_eligible(
            "this request has not been scanned yet",
        )),
        ScanEligibility::NotAccepted(status) => Err(LifecycleError::NotEligible(format!(
            "the join request is {}, not accepted",
            status
        ))),
    }
}
