// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::{
    BaseEmailService, BasePushNotificationService, BaseWalletLedger, MemoryStore, ServerDeps,
    WalletCredit,
};
use crate::common::TransportError;
use crate::kernel::stream_session::{Frame, StreamTransport};

/// How a mock collaborator answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Succeed,
    Fail,
    Stall,
}

async fn behave(behavior: Behavior, what: &str) -> Result<()> {
    match behavior {
        Behavior::Succeed => Ok(()),
        Behavior::Fail => anyhow::bail!("{} unavailable", what),
        Behavior::Stall => {
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

// =============================================================================
// Mock Email Service
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    behavior: Behavior,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            behavior: Behavior::Succeed,
        }
    }

    /// Every send is recorded, then fails.
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::new()
        }
    }

    /// Every send is recorded, then never completes.
    pub fn stalling() -> Self {
        Self {
            behavior: Behavior::Stall,
            ..Self::new()
        }
    }

    /// All emails attempted, in order
    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == email)
            .cloned()
            .collect()
    }
}

impl Default for MockEmailService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEmailService for MockEmailService {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        behave(self.behavior, "email").await
    }
}

// =============================================================================
// Mock Push Notification Service
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SentPush {
    pub email: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

pub struct MockPushService {
    sent: Arc<Mutex<Vec<SentPush>>>,
    behavior: Behavior,
}

impl MockPushService {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            behavior: Behavior::Succeed,
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            ..Self::new()
        }
    }

    pub fn stalling() -> Self {
        Self {
            behavior: Behavior::Stall,
            ..Self::new()
        }
    }

    /// Get all notifications that were attempted
    pub fn sent_notifications(&self) -> Vec<SentPush> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<SentPush> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.email == email)
            .cloned()
            .collect()
    }
}

impl Default for MockPushService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePushNotificationService for MockPushService {
    async fn send_notification(
        &self,
        email: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(SentPush {
            email: email.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
        behave(self.behavior, "push").await
    }
}

// =============================================================================
// Flaky Wallet
// =============================================================================

/// Ledger whose first `failures` credits error out before reaching the
/// underlying store.
pub struct FlakyWallet {
    inner: MemoryStore,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyWallet {
    pub fn new(inner: MemoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn always_failing(inner: MemoryStore) -> Self {
        Self::new(inner, usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseWalletLedger for FlakyWallet {
    async fn credit(&self, credit: WalletCredit) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            anyhow::bail!("wallet ledger unavailable");
        }
        self.inner.credit(credit).await
    }

    async fn balance_cents(&self, owner_email: &str) -> Result<i64> {
        self.inner.balance_cents(owner_email).await
    }
}

// =============================================================================
// Recording Transport
// =============================================================================

/// Stream transport that keeps every written frame.
pub struct RecordingTransport {
    frames: Mutex<Vec<Frame>>,
    attempts: AtomicUsize,
    close_calls: AtomicUsize,
    succeed_first: Option<usize>,
    stall: bool,
    written: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            succeed_first: None,
            stall: false,
            written: Notify::new(),
        }
    }

    /// The first `n` writes succeed, every later one fails.
    pub fn failing_after(n: usize) -> Self {
        Self {
            succeed_first: Some(n),
            ..Self::new()
        }
    }

    /// Writes never complete.
    pub fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::new()
        }
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    /// Wait until at least `n` frames were written. Panics after five seconds.
    pub async fn wait_for_frames(&self, n: usize) -> Vec<Frame> {
        let wait = async {
            loop {
                let written = self.written.notified();
                {
                    let frames = self.frames.lock().unwrap();
                    if frames.len() >= n {
                        return frames.clone();
                    }
                }
                written.await;
            }
        };
        match tokio::time::timeout(Duration::from_secs(5), wait).await {
            Ok(frames) => frames,
            Err(_) => panic!("timed out waiting for {} frames, got {:?}", n, self.frames()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamTransport for RecordingTransport {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        if matches!(self.succeed_first, Some(n) if attempt >= n) {
            return Err(TransportError::Disconnected);
        }
        self.frames.lock().unwrap().push(frame);
        self.written.notify_waiters();
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: MemoryStore,
    pub wallet: Option<Arc<dyn BaseWalletLedger>>,
    pub email_service: Arc<MockEmailService>,
    pub push_service: Arc<MockPushService>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            wallet: None,
            email_service: Arc::new(MockEmailService::new()),
            push_service: Arc::new(MockPushService::new()),
        }
    }

    /// Set a mock email service
    pub fn mock_email(mut self, service: MockEmailService) -> Self {
        self.email_service = Arc::new(service);
        self
    }

    /// Set a mock push notification service
    pub fn mock_push(mut self, service: MockPushService) -> Self {
        self.push_service = Arc::new(service);
        self
    }

    /// Replace the ledger; defaults to the memory store's own.
    pub fn wallet(mut self, wallet: Arc<dyn BaseWalletLedger>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Convert into ServerDeps with a short notification timeout
    pub fn into_deps(self) -> Arc<ServerDeps> {
        let wallet = self
            .wallet
            .unwrap_or_else(|| Arc::new(self.store.clone()) as Arc<dyn BaseWalletLedger>);
        Arc::new(
            ServerDeps::new(
                Arc::new(self.store),
                wallet,
                self.email_service,
                self.push_service,
            )
            .with_notification_timeout(Duration::from_millis(200)),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
