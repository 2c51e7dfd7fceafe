use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::handle::{StreamFailure, StreamId};
use super::payload::Payload;

/// Receives the messages and the terminal signal of one stream.
///
/// Calls come from the relay task in arrival order: any number of
/// `on_message`, then exactly one of `on_complete` / `on_error`.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    fn on_message(&self, payload: Payload);

    fn on_complete(&self);

    fn on_error(&self, failure: &StreamFailure);

    /// True once nobody is listening anymore; the relay then cancels the stream
    fn is_detached(&self) -> bool {
        false
    }

    /// Resolves once the sink detaches. Sinks that never detach stay pending.
    async fn detached(&self) {
        std::future::pending::<()>().await
    }
}

/// Logs every message, the baseline behaviour of the bridge
pub struct LogSink {
    stream_id: StreamId,
}

impl LogSink {
    pub fn new(stream_id: StreamId) -> Self {
        Self { stream_id }
    }
}

impl Sink for LogSink {
    fn on_message(&self, payload: Payload) {
        info!(stream_id = %self.stream_id, "{}", payload.text());
    }

    fn on_complete(&self) {
        info!(stream_id = %self.stream_id, "Stream completed");
    }

    fn on_error(&self, failure: &StreamFailure) {
        warn!(
            stream_id = %self.stream_id,
            kind = ?failure.kind,
            code = failure.code.as_deref().unwrap_or("-"),
            "Stream failed: {}",
            failure
        );
    }
}

/// Stream events as seen by the UI side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Message { stream_id: StreamId, payload: Payload },
    Completed { stream_id: StreamId },
    Failed { stream_id: StreamId, error: StreamFailure },
}

impl StreamEvent {
    pub fn stream_id(&self) -> StreamId {
        match self {
            StreamEvent::Message { stream_id, .. }
            | StreamEvent::Completed { stream_id }
            | StreamEvent::Failed { stream_id, .. } => *stream_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Message { .. })
    }
}

/// Forwards events over a channel toward the UI, errors included
pub struct ForwardSink<T> {
    stream_id: StreamId,
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ForwardSink<T>
where
    T: From<StreamEvent> + Send + 'static,
{
    pub fn new(stream_id: StreamId, tx: mpsc::UnboundedSender<T>) -> Self {
        Self { stream_id, tx }
    }

    fn forward(&self, event: StreamEvent) {
        if self.tx.send(event.into()).is_err() {
            debug!(stream_id = %self.stream_id, "UI side gone, event dropped");
        }
    }
}

#[async_trait::async_trait]
impl<T> Sink for ForwardSink<T>
where
    T: From<StreamEvent> + Send + 'static,
{
    fn on_message(&self, payload: Payload) {
        self.forward(StreamEvent::Message {
            stream_id: self.stream_id,
            payload,
        });
    }

    fn on_complete(&self) {
        self.forward(StreamEvent::Completed {
            stream_id: self.stream_id,
        });
    }

    fn on_error(&self, failure: &StreamFailure) {
        self.forward(StreamEvent::Failed {
            stream_id: self.stream_id,
            error: failure.clone(),
        });
    }

    fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }

    async fn detached(&self) {
        self.tx.closed().await
    }
}
