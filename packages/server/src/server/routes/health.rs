use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::domains::events::ALL_CHANNELS;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    store: StoreHealth,
    event_bus: EventBusHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    kind: &'static str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct EventBusHealth {
    status: String,
    subscribers: usize,
}

/// Health check endpoint
///
/// Checks:
/// - Database connectivity and responsiveness (when a database is configured)
/// - Event bus subscriber count
///
/// Returns 200 OK if all systems are healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store = match &state.db_pool {
        Some(pool) => match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(pool),
        )
        .await
        {
            Ok(Ok(_)) => StoreHealth {
                kind: "postgres",
                status: "ok".to_string(),
                error: None,
            },
            Ok(Err(e)) => StoreHealth {
                kind: "postgres",
                status: "error".to_string(),
                error: Some(format!("Query failed: {}", e)),
            },
            Err(_) => StoreHealth {
                kind: "postgres",
                status: "error".to_string(),
                error: Some("Query timeout (>5s)".to_string()),
            },
        },
        None => StoreHealth {
            kind: "memory",
            status: "ok".to_string(),
            error: None,
        },
    };

    let subscribers = ALL_CHANNELS
        .iter()
        .map(|channel| state.deps.bus.subscriber_count(channel))
        .sum();

    let is_healthy = store.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            store,
            event_bus: EventBusHealth {
                status: "ok".to_string(),
                subscribers,
            },
        }),
    )
}
