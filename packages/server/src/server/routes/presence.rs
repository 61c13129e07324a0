use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;

use crate::server::app::AppState;
use crate::server::middleware::Caller;

#[derive(Debug, Deserialize)]
pub struct PresenceBody {
    pub active: bool,
}

/// POST /api/presence - clients report foreground/background transitions and
/// refresh `active` periodically while in the app.
pub async fn presence_handler(
    Extension(state): Extension<AppState>,
    caller: Caller,
    Json(body): Json<PresenceBody>,
) -> StatusCode {
    if body.active {
        state.deps.visibility.set_active(&caller.email);
    } else {
        state.deps.visibility.set_inactive(&caller.email);
    }
    StatusCode::NO_CONTENT
}
