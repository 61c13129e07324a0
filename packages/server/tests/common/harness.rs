//! Test harness for integration testing.
//!
//! `TestHarness` wires the lifecycle against the in-memory store and mock
//! notification services. `PostgresHarness` starts one shared Postgres
//! container (testcontainers) for the store tests; those need Docker.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use crew_core::domains::events::{DomainEvent, ALL_CHANNELS};
use crew_core::kernel::test_dependencies::{
    MockEmailService, MockPushService, RecordingTransport, TestDependencies,
};
use crew_core::kernel::{MemoryStore, ServerDeps, SessionConfig, StreamSession};
use crew_core::server::{build_app, AppState};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Install a test-friendly tracing subscriber once.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory lifecycle with recording collaborators.
pub struct TestHarness {
    pub deps: Arc<ServerDeps>,
    pub store: MemoryStore,
    pub email: Arc<MockEmailService>,
    pub push: Arc<MockPushService>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(TestDependencies::new())
    }

    pub fn with(test_deps: TestDependencies) -> Self {
        init_tracing();
        let store = test_deps.store.clone();
        let email = test_deps.email_service.clone();
        let push = test_deps.push_service.clone();
        Self {
            deps: test_deps.into_deps(),
            store,
            email,
            push,
        }
    }

    pub fn with_email(email: MockEmailService) -> Self {
        Self::with(TestDependencies::new().mock_email(email))
    }

    pub fn with_push(push: MockPushService) -> Self {
        Self::with(TestDependencies::new().mock_push(push))
    }

    /// Open a stream session on the harness bus, recording its frames.
    pub fn open_session(&self) -> (StreamSession<DomainEvent>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = StreamSession::open(
            &self.deps.bus,
            &ALL_CHANNELS,
            transport.clone(),
            SessionConfig::default(),
        );
        (session, transport)
    }

    /// The HTTP router over this harness' dependencies.
    pub fn router(&self) -> Router {
        build_app(
            AppState {
                deps: self.deps.clone(),
                db_pool: None,
            },
            &[],
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared Postgres container; started on first use, reused by every test.
struct SharedPostgres {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_POSTGRES
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared Postgres")
            })
            .await
    }
}

pub struct PostgresHarness {
    pub db_pool: PgPool,
}

impl PostgresHarness {
    pub async fn new() -> Result<Self> {
        let shared = SharedPostgres::get().await;
        let db_pool = PgPool::connect(&shared.db_url)
            .await
            .context("Failed to connect to test database")?;
        Ok(Self { db_pool })
    }
}
