//! Stream relay
//!
//! Drives a [`StreamHandle`] to a terminal state and turns raw transport
//! events into the sink contract: every message exactly once and in arrival
//! order, then a single completion or error, then nothing.

mod cancel;
mod handle;
mod payload;
mod sink;

pub use cancel::{CancelHandle, CancelToken};
pub use handle::{Delivery, FailureKind, StreamFailure, StreamHandle, StreamId, StreamState};
pub use payload::{ArgumentPayload, Payload};
pub use sink::{ForwardSink, LogSink, Sink, StreamEvent};

use tracing::{debug, info};

use crate::rpc::TransportEvent;

/// How a relayed stream ended
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub id: StreamId,
    pub state: StreamState,
    /// Messages handed to the sink
    pub delivered: u64,
    pub failure: Option<StreamFailure>,
}

enum Step {
    Cancelled,
    Detached,
    Event(TransportEvent),
}

/// Relay `handle` into `sink` until the stream terminates or `cancel` fires.
///
/// The handle is dropped on return, releasing the call.
pub async fn relay(mut handle: StreamHandle, sink: &dyn Sink, mut cancel: CancelToken) -> StreamOutcome {
    let id = handle.id();
    debug!(stream_id = %id, call = %handle.call(), "Relaying stream");

    let mut delivered = 0u64;
    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = sink.detached() => Step::Detached,
            event = handle.next_event() => Step::Event(event),
        };

        let delivery = match step {
            Step::Cancelled => handle.cancel("stream cancelled"),
            Step::Detached => handle.cancel("sink detached"),
            Step::Event(_) if sink.is_detached() => handle.cancel("sink detached"),
            Step::Event(event) => handle.advance(event),
        };

        match delivery {
            Some(Delivery::Message(payload)) => {
                delivered += 1;
                sink.on_message(payload);
            }
            Some(Delivery::Complete) => {
                sink.on_complete();
                break;
            }
            Some(Delivery::Error(failure)) => {
                sink.on_error(&failure);
                break;
            }
            None => break,
        }
    }

    let outcome = StreamOutcome {
        id,
        state: handle.state(),
        delivered,
        failure: handle.failure().cloned(),
    };
    drop(handle);

    info!(
        stream_id = %id,
        state = ?outcome.state,
        delivered = outcome.delivered,
        "Stream finished"
    );
    outcome
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Message(String),
        Complete,
        Error(StreamFailure),
    }

    /// Records every sink call in order
    #[derive(Default)]
    pub struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn messages(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SinkCall::Message(text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn completions(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, SinkCall::Complete))
                .count()
        }

        pub fn errors(&self) -> Vec<StreamFailure> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SinkCall::Error(failure) => Some(failure),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, call: SinkCall) {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
        }
    }

    impl Sink for RecordingSink {
        fn on_message(&self, payload: Payload) {
            self.push(SinkCall::Message(payload.text().to_string()));
        }

        fn on_complete(&self) {
            self.push(SinkCall::Complete);
        }

        fn on_error(&self, failure: &StreamFailure) {
            self.push(SinkCall::Error(failure.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::testing::{RecordingSink, SinkCall};
    use super::*;
    use crate::rpc::mock::MockChannel;
    use crate::rpc::{CallPath, RpcChannel};

    fn call() -> CallPath {
        CallPath::parse("flaunch.ScriptEngine/GetAll").unwrap()
    }

    fn scripted(events: Vec<TransportEvent>) -> StreamHandle {
        let (channel, _calls) = MockChannel::new();
        channel.with_script(events).open_stream(&call())
    }

    #[tokio::test]
    async fn test_single_message_then_end() {
        let handle = scripted(vec![TransportEvent::message("alpha"), TransportEvent::End]);
        let sink = RecordingSink::new();

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert_eq!(
            sink.calls(),
            vec![SinkCall::Message("alpha".into()), SinkCall::Complete]
        );
        assert_eq!(outcome.state, StreamState::Completed);
        assert_eq!(outcome.delivered, 1);
        assert!(outcome.failure.is_none());
    }

    #[tokio::test]
    async fn test_error_before_any_message() {
        let handle = scripted(vec![TransportEvent::error("connection reset")]);
        let sink = RecordingSink::new();

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert!(sink.messages().is_empty());
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "connection reset");
        assert_eq!(errors[0].kind, FailureKind::Connection);
        assert_eq!(sink.completions(), 0);
        assert_eq!(outcome.state, StreamState::Failed);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let handle = scripted(vec![
            TransportEvent::message("a"),
            TransportEvent::message("b"),
            TransportEvent::message("c"),
            TransportEvent::End,
        ]);
        let sink = RecordingSink::new();

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Message("a".into()),
                SinkCall::Message("b".into()),
                SinkCall::Message("c".into()),
                SinkCall::Complete,
            ]
        );
        assert_eq!(outcome.delivered, 3);
    }

    #[tokio::test]
    async fn test_n_messages_then_one_terminal_call() {
        for n in [0usize, 1, 7, 100] {
            for fail in [false, true] {
                let mut events: Vec<_> = (0..n)
                    .map(|i| TransportEvent::message(format!("m{}", i)))
                    .collect();
                events.push(if fail {
                    TransportEvent::error("aborted")
                } else {
                    TransportEvent::End
                });

                let sink = RecordingSink::new();
                let outcome = relay(scripted(events), &sink, CancelToken::never()).await;

                let expected: Vec<String> = (0..n).map(|i| format!("m{}", i)).collect();
                assert_eq!(sink.messages(), expected);
                assert_eq!(sink.completions() + sink.errors().len(), 1);
                assert_eq!(sink.calls().len(), n + 1);
                assert_eq!(outcome.delivered, n as u64);
                if fail {
                    let kind = sink.errors()[0].kind;
                    let expected_kind = if n == 0 {
                        FailureKind::Connection
                    } else {
                        FailureKind::MidStream
                    };
                    assert_eq!(kind, expected_kind);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_terminal_events_produce_no_calls() {
        let handle = scripted(vec![
            TransportEvent::message("a"),
            TransportEvent::error("reset"),
            TransportEvent::End,
            TransportEvent::error("reset again"),
            TransportEvent::message("ghost"),
        ]);
        let sink = RecordingSink::new();

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert_eq!(sink.calls().len(), 2);
        assert_eq!(sink.messages(), vec!["a".to_string()]);
        assert_eq!(sink.errors()[0].kind, FailureKind::MidStream);
        assert_eq!(outcome.state, StreamState::Failed);
    }

    #[tokio::test]
    async fn test_silent_backend_stays_connecting_until_error() {
        let (channel, mut calls) = MockChannel::new();
        let handle = channel.open_stream(&call());
        let mut state = handle.watch_state();
        let backend = calls.recv().await.unwrap();

        let sink = std::sync::Arc::new(RecordingSink::new());
        let relay_sink = sink.clone();
        let task = tokio::spawn(async move {
            relay(handle, relay_sink.as_ref(), CancelToken::never()).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*state.borrow(), StreamState::Connecting);
        assert!(sink.calls().is_empty());

        backend
            .events
            .send(TransportEvent::error("endpoint unreachable"))
            .await
            .unwrap();
        let outcome = task.await.unwrap();

        state.changed().await.ok();
        assert_eq!(*state.borrow(), StreamState::Failed);
        assert_eq!(outcome.state, StreamState::Failed);
        assert!(sink.messages().is_empty());
        assert_eq!(sink.errors()[0].kind, FailureKind::Connection);
    }

    #[tokio::test]
    async fn test_cancel_fails_stream_and_releases_call() {
        let (channel, mut calls) = MockChannel::new();
        let handle = channel.open_stream(&call());
        let backend = calls.recv().await.unwrap();
        backend.events.send(TransportEvent::message("a")).await.unwrap();

        let cancel = CancelHandle::new();
        let token = cancel.token();
        let sink = std::sync::Arc::new(RecordingSink::new());
        let relay_sink = sink.clone();
        let task = tokio::spawn(async move { relay(handle, relay_sink.as_ref(), token).await });

        // Wait until the first message went through
        while sink.messages().is_empty() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(outcome.state, StreamState::Failed);
        assert_eq!(outcome.failure.unwrap().kind, FailureKind::Cancelled);
        assert_eq!(sink.errors().len(), 1);
        assert_eq!(sink.completions(), 0);
        assert!(backend.events.is_closed());
    }

    #[tokio::test]
    async fn test_closed_transport_without_end_fails() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(TransportEvent::message("a")).await.unwrap();
        drop(tx);
        let handle = StreamHandle::new(call(), rx);
        let sink = RecordingSink::new();

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert_eq!(outcome.state, StreamState::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::MidStream);
        assert_eq!(failure.message, "transport closed");
    }

    struct DetachedSink {
        detached: AtomicBool,
        inner: RecordingSink,
    }

    impl Sink for DetachedSink {
        fn on_message(&self, payload: Payload) {
            self.inner.on_message(payload);
        }

        fn on_complete(&self) {
            self.inner.on_complete();
        }

        fn on_error(&self, failure: &StreamFailure) {
            self.inner.on_error(failure);
        }

        fn is_detached(&self) -> bool {
            self.detached.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_detached_sink_cancels_stream() {
        let handle = scripted(vec![
            TransportEvent::message("a"),
            TransportEvent::message("b"),
            TransportEvent::End,
        ]);
        let sink = DetachedSink {
            detached: AtomicBool::new(true),
            inner: RecordingSink::new(),
        };

        let outcome = relay(handle, &sink, CancelToken::never()).await;

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.failure.unwrap().kind, FailureKind::Cancelled);
    }
}
