//! SSE streaming endpoint.
//!
//! GET /api/events/stream
//!
//! Opens one stream session per connection. The session writes into a
//! bounded channel; the receiving half becomes the SSE body. When the client
//! goes away the body is dropped, which closes the session.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::Extension,
    response::sse::{Event, Sse},
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::domains::events::{DomainEvent, ALL_CHANNELS};
use crate::kernel::{ChannelTransport, Frame, StreamSession};
use crate::server::app::AppState;

/// Frames buffered per connection before a write has to wait.
const STREAM_BUFFER: usize = 64;

/// Closes the session when the response body is dropped.
struct SessionGuard(StreamSession<DomainEvent>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// SSE stream handler. Every connected client receives every domain event.
pub async fn stream_handler(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (transport, rx) = ChannelTransport::new(STREAM_BUFFER);
    let session = StreamSession::open(
        &state.deps.bus,
        &ALL_CHANNELS,
        Arc::new(transport),
        state.deps.session_config.clone(),
    );
    let guard = SessionGuard(session);

    let events = ReceiverStream::new(rx).filter_map(move |frame| {
        let _session = &guard;
        futures::future::ready(to_sse_event(frame).map(Ok))
    });

    Sse::new(events)
}

fn to_sse_event(frame: Frame) -> Option<Event> {
    match Event::default().event(&frame.event).json_data(&frame.data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Dropping unencodable frame");
            None
        }
    }
}
