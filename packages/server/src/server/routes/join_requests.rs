use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::JoinRequestId;
use crate::domains::events::JoinRequestPayload;
use crate::domains::join_requests::{actions, Decision, NewJoinRequest, ScanResult};
use crate::kernel::EffectOutcome;
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::Caller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub event_slug: String,
    pub group_name: String,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub decision: Decision,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBody {
    pub event_slug: String,
    pub group_name: String,
    pub member_email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub request: JoinRequestPayload,
    pub outcome: EffectOutcome,
    pub first_scan: bool,
}

impl From<ScanResult> for ScanResponse {
    fn from(result: ScanResult) -> Self {
        Self {
            first_scan: result.is_first_scan(),
            request: JoinRequestPayload::from(&result.request),
            outcome: result.outcome,
        }
    }
}

/// POST /api/join-requests - submit (or fetch the active request) for the caller
pub async fn submit_join_request_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Json(body): Json<SubmitBody>,
) -> Result<Json<JoinRequestPayload>, ApiError> {
    let request = actions::submit(
        NewJoinRequest {
            event_slug: body.event_slug,
            group_name: body.group_name,
            member_email: caller.email,
            amount_cents: body.amount_cents,
            currency: body.currency,
            method: body.method,
        },
        &state.deps,
    )
    .await?;

    Ok(Json(JoinRequestPayload::from(&request)))
}

/// POST /api/join-requests/:id/decision - owner only
pub async fn decide_join_request_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Path(id): Path<JoinRequestId>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<JoinRequestPayload>, ApiError> {
    let request = actions::decide(id, body.decision, &caller.email, &state.deps).await?;
    Ok(Json(JoinRequestPayload::from(&request)))
}

/// POST /api/join-requests/:id/ack-scan - broadcast fallback for a scan
pub async fn acknowledge_scan_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Path(id): Path<JoinRequestId>,
) -> Result<Json<ScanResponse>, ApiError> {
    let result = actions::acknowledge_scan(id, &caller.email, &state.deps).await?;
    Ok(Json(result.into()))
}

/// POST /api/scan - door scan by the group owner
pub async fn scan_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Json(body): Json<ScanBody>,
) -> Result<Json<ScanResponse>, ApiError> {
    let result = actions::scan(
        &body.event_slug,
        &body.group_name,
        &body.member_email,
        &caller.email,
        &state.deps,
    )
    .await?;
    Ok(Json(result.into()))
}
