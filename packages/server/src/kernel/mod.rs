//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod email;
pub mod event_bus;
pub mod expo;
pub mod idempotency;
pub mod key_lock;
pub mod memory_store;
pub mod postgres_store;
pub mod stream_session;
pub mod test_dependencies;
pub mod traits;
pub mod visibility;

pub use deps::ServerDeps;
pub use email::{HttpEmailService, LogEmailService};
pub use event_bus::{BusEvent, EventBus, PublishReport, Subscription};
pub use expo::{ExpoClient, ExpoPushService, NoopPushService};
pub use idempotency::{
    DedupKey, EffectOutcome, IdempotencyGuard, TransitionKind, DEFAULT_DEDUP_RETENTION,
};
pub use key_lock::KeyedLocks;
pub use memory_store::MemoryStore;
pub use postgres_store::PostgresStore;
pub use stream_session::{ChannelTransport, Frame, SessionConfig, StreamSession, StreamTransport};
pub use test_dependencies::TestDependencies;
pub use traits::*;
pub use visibility::VisibilityRegistry;
