use axum::{extract::Extension, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::GroupId;
use crate::domains::groups::{actions, Group, NewGroup};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::Caller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBody {
    pub event_slug: String,
    pub name: String,
    #[serde(default)]
    pub cohort_capacity: i32,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: GroupId,
    pub event_slug: String,
    pub name: String,
    pub owner_email: String,
    pub owner_name: String,
    pub cohort_capacity: i32,
    pub total_capacity: i32,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            total_capacity: group.total_capacity(),
            event_slug: group.event_slug,
            name: group.name,
            owner_email: group.owner_email,
            owner_name: group.owner_name,
            cohort_capacity: group.cohort_capacity,
            price_cents: group.price_cents,
            currency: group.currency,
            created_at: group.created_at,
        }
    }
}

/// POST /api/groups - the caller becomes the owner
pub async fn create_group_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    let owner_name = caller
        .name
        .clone()
        .unwrap_or_else(|| caller.email.split('@').next().unwrap_or_default().to_string());

    let group = actions::create_group(
        NewGroup {
            event_slug: body.event_slug,
            name: body.name,
            owner_email: caller.email,
            owner_name,
            cohort_capacity: body.cohort_capacity,
            price_cents: body.price_cents,
            currency: body.currency,
        },
        &state.deps,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(group.into())))
}
