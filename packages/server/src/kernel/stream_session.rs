//! One long-lived push connection bound to the event bus.
//!
//! A session subscribes to a set of bus channels, writes a `connected` frame,
//! then forwards every event as an `{event, data}` frame in publish order. A
//! heartbeat frame goes out every `heartbeat_interval` so proxies keep idle
//! connections open. Any failed or stalled write tears the session down.
//!
//! Sessions never replay: a client that connects after an event was published
//! must fetch current state from the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::TransportError;
use crate::kernel::event_bus::{BusEvent, EventBus, Subscription};

pub const CONNECTED_EVENT: &str = "connected";
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// A discrete frame written to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub data: serde_json::Value,
}

impl Frame {
    pub fn connected(session_id: Uuid) -> Self {
        Self {
            event: CONNECTED_EVENT.to_string(),
            data: serde_json::json!({ "sessionId": session_id }),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            event: HEARTBEAT_EVENT.to_string(),
            data: serde_json::json!({ "at": chrono::Utc::now() }),
        }
    }

    pub fn from_event<E: BusEvent>(event: &E) -> Result<Self, TransportError> {
        Ok(Self {
            event: event.channel().to_string(),
            data: event.payload()?,
        })
    }
}

/// Outbound side of one client connection.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Write one frame. An error means the peer is gone.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Release the connection. Called once, on teardown.
    fn close(&self);
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat period; also the longest a single write may take.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
        }
    }
}

struct SessionInner<E> {
    id: Uuid,
    closed: Arc<AtomicBool>,
    subscriptions: Mutex<Vec<Subscription<E>>>,
    cancel: CancellationToken,
    transport: Arc<dyn StreamTransport>,
    config: SessionConfig,
}

/// Handle to a live session. Clones refer to the same connection.
pub struct StreamSession<E> {
    inner: Arc<SessionInner<E>>,
}

impl<E> Clone for StreamSession<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: BusEvent> StreamSession<E> {
    /// Subscribe to `channels` and start the writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        bus: &EventBus<E>,
        channels: &[&'static str],
        transport: Arc<dyn StreamTransport>,
        config: SessionConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();

        let subscriptions = channels
            .iter()
            .map(|&channel| {
                let tx = tx.clone();
                let closed = closed.clone();
                bus.subscribe(channel, move |event: &E| {
                    if closed.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    let frame = Frame::from_event(event)?;
                    tx.send(frame)
                        .map_err(|_| anyhow::anyhow!("stream writer stopped"))
                })
            })
            .collect();

        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                closed,
                subscriptions: Mutex::new(subscriptions),
                cancel: CancellationToken::new(),
                transport,
                config,
            }),
        };

        info!(session_id = %id, channels = channels.len(), "Stream session opened");
        tokio::spawn(run_writer(session.clone(), rx));
        session
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session has been torn down.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Tear the session down: unsubscribe everywhere, stop the heartbeat and
    /// close the transport.
    ///
    /// Idempotent, and safe to call from inside a bus handler.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscriptions = std::mem::take(
            &mut *self
                .inner
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        drop(subscriptions);

        self.inner.cancel.cancel();
        self.inner.transport.close();
        info!(session_id = %self.inner.id, "Stream session closed");
    }

    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        let limit = self.inner.config.heartbeat_interval;
        match tokio::time::timeout(limit, self.inner.transport.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(limit.as_millis())),
        }
    }
}

async fn run_writer<E: BusEvent>(session: StreamSession<E>, mut rx: mpsc::UnboundedReceiver<Frame>) {
    let session_id = session.id();

    if let Err(e) = session.write(Frame::connected(session_id)).await {
        warn!(session_id = %session_id, error = %e, "Failed to send connected frame");
        session.close();
        return;
    }

    let period = session.inner.config.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = session.inner.cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = heartbeat.tick() => Frame::heartbeat(),
        };

        if session.is_closed() {
            break;
        }

        let event = frame.event.clone();
        if let Err(e) = session.write(frame).await {
            warn!(session_id = %session_id, event = %event, error = %e, "Stream write failed, closing session");
            break;
        }
        debug!(session_id = %session_id, event = %event, "Frame written");
    }

    session.close();
}

/// Transport backed by a bounded channel; the receiving half feeds an HTTP
/// response body (see the SSE route).
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl ChannelTransport {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl StreamTransport for ChannelTransport {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match tx {
            Some(tx) => tx.send(frame).await.map_err(|_| TransportError::Disconnected),
            None => Err(TransportError::Disconnected),
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
