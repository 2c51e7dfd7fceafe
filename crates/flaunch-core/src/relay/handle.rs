use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::payload::Payload;
use crate::rpc::{CallPath, TransportError, TransportEvent};

pub type StreamId = Uuid;

/// Lifecycle of one streaming call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Call issued, nothing received yet
    Connecting,
    /// At least one message received
    Streaming,
    /// Backend signalled end of stream
    Completed,
    /// Transport or protocol error, or cancelled
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Failed before any message arrived
    Connection,
    /// Backend aborted after partial delivery
    MidStream,
    /// Closed early on our side
    Cancelled,
}

/// Error info handed to the sink when a stream fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What the sink must be told after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Message(Payload),
    Complete,
    Error(StreamFailure),
}

/// One in-flight streaming call.
///
/// Owned by the relay driving it. Dropping the handle closes its event queue,
/// which releases the underlying call.
#[derive(Debug)]
pub struct StreamHandle {
    id: StreamId,
    call: CallPath,
    events: mpsc::Receiver<TransportEvent>,
    state: watch::Sender<StreamState>,
    received: u64,
    failure: Option<StreamFailure>,
}

impl StreamHandle {
    pub fn new(call: CallPath, events: mpsc::Receiver<TransportEvent>) -> Self {
        let (state, _) = watch::channel(StreamState::Connecting);
        Self {
            id: Uuid::new_v4(),
            call,
            events,
            state,
            received: 0,
            failure: None,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn call(&self) -> &CallPath {
        &self.call
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Follow state transitions from outside the relay
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Messages received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }

    /// Next raw event. A queue closed without a terminal event reads as an error.
    pub(crate) async fn next_event(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => TransportEvent::Error(TransportError::new("transport closed")),
        }
    }

    /// Apply one transport event. Returns `None` once the stream is terminal.
    pub fn advance(&mut self, event: TransportEvent) -> Option<Delivery> {
        let state = self.state();
        if state.is_terminal() {
            return None;
        }

        match event {
            TransportEvent::Message(script) => {
                self.received += 1;
                if state == StreamState::Connecting {
                    self.set_state(StreamState::Streaming);
                }
                Some(Delivery::Message(Payload::from(script)))
            }
            TransportEvent::End => {
                self.finish(StreamState::Completed);
                Some(Delivery::Complete)
            }
            TransportEvent::Error(error) => {
                let kind = if state == StreamState::Connecting {
                    FailureKind::Connection
                } else {
                    FailureKind::MidStream
                };
                Some(self.fail(StreamFailure {
                    kind,
                    code: error.code,
                    message: error.message,
                }))
            }
        }
    }

    /// Force the stream into `Failed` without waiting for the backend
    pub fn cancel(&mut self, reason: impl Into<String>) -> Option<Delivery> {
        if self.state().is_terminal() {
            return None;
        }
        Some(self.fail(StreamFailure {
            kind: FailureKind::Cancelled,
            code: None,
            message: reason.into(),
        }))
    }

    fn fail(&mut self, failure: StreamFailure) -> Delivery {
        self.failure = Some(failure.clone());
        self.finish(StreamState::Failed);
        Delivery::Error(failure)
    }

    fn finish(&mut self, state: StreamState) {
        self.set_state(state);
        // Lets the producer stop before the handle itself is dropped
        self.events.close();
    }

    fn set_state(&self, state: StreamState) {
        self.state.send_replace(state);
    }
}
