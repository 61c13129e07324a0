//! Application setup and server configuration.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::kernel::{
    BaseEmailService, BasePushNotificationService, BaseStore, BaseWalletLedger, ExpoClient,
    ExpoPushService, HttpEmailService, LogEmailService, MemoryStore, NoopPushService,
    PostgresStore, ServerDeps,
};
use crate::server::middleware::{identity_middleware, USER_EMAIL_HEADER, USER_NAME_HEADER};
use crate::server::routes::{
    acknowledge_scan_handler, create_group_handler, decide_join_request_handler, health_handler,
    list_messages_handler, post_message_handler, presence_handler, scan_handler, stream_handler,
    submit_join_request_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    /// Present when running on Postgres; used by the health check.
    pub db_pool: Option<PgPool>,
}

/// Wire the collaborators for `config`: Postgres when a pool is given, the
/// in-process store otherwise, and logging fallbacks for unconfigured
/// email or push.
pub fn build_deps(config: &Config, pool: Option<PgPool>) -> Result<ServerDeps> {
    let (store, wallet): (Arc<dyn BaseStore>, Arc<dyn BaseWalletLedger>) = match pool {
        Some(pool) => {
            let store = PostgresStore::new(pool);
            (Arc::new(store.clone()), Arc::new(store))
        }
        None => {
            warn!("No DATABASE_URL, using in-memory store; data is lost on restart");
            let store = MemoryStore::new();
            (Arc::new(store.clone()), Arc::new(store))
        }
    };

    let email_service: Arc<dyn BaseEmailService> = match &config.email {
        Some(email) => Arc::new(HttpEmailService::new(email)?),
        None => {
            info!("Email not configured, emails will only be logged");
            Arc::new(LogEmailService)
        }
    };

    let push_service: Arc<dyn BasePushNotificationService> = match &config.expo_access_token {
        Some(token) => Arc::new(ExpoPushService::new(
            ExpoClient::new(Some(token.clone())),
            store.clone(),
        )),
        None => {
            info!("EXPO_ACCESS_TOKEN not set, push notifications will only be logged");
            Arc::new(NoopPushService)
        }
    };

    Ok(ServerDeps::new(store, wallet, email_service, push_service)
        .with_notification_timeout(config.notification_timeout)
        .with_presence_window(config.presence_window)
        .with_heartbeat_interval(config.stream_heartbeat)
        .with_dedup_retention(config.dedup_retention))
}

/// Build the Axum application router
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // No configured origins means development: allow any
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(USER_EMAIL_HEADER),
            HeaderName::from_static(USER_NAME_HEADER),
        ]);

    Router::new()
        .route("/api/groups", post(create_group_handler))
        .route("/api/join-requests", post(submit_join_request_handler))
        .route("/api/join-requests/:id/decision", post(decide_join_request_handler))
        .route("/api/join-requests/:id/ack-scan", post(acknowledge_scan_handler))
        .route("/api/scan", post(scan_handler))
        .route(
            "/api/conversations/messages",
            get(list_messages_handler).post(post_message_handler),
        )
        .route("/api/presence", post(presence_handler))
        .route("/api/events/stream", get(stream_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(identity_middleware))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
