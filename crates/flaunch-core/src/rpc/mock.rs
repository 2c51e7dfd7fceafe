//! In-memory channel for tests and local wiring
//!
//! Every opened call is announced on an unbounded queue together with the
//! sender feeding its handle, so a test can play the backend: push messages,
//! end or fail the call, or stay silent like an unreachable endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use super::{CallPath, RpcChannel, TransportEvent};
use crate::relay::{StreamHandle, StreamId};

/// Room left in each call's queue on top of its script
const MOCK_BUFFER: usize = 32;

/// One call opened on a [`MockChannel`]
#[derive(Debug)]
pub struct MockCall {
    pub call: CallPath,
    pub stream_id: StreamId,
    pub events: mpsc::Sender<TransportEvent>,
}

pub struct MockChannel {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    calls_tx: mpsc::UnboundedSender<MockCall>,
    opened: AtomicUsize,
}

impl MockChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockCall>) {
        let (calls_tx, calls_rx) = mpsc::unbounded_channel();
        let channel = Self {
            scripts: Mutex::new(VecDeque::new()),
            calls_tx,
            opened: AtomicUsize::new(0),
        };
        (channel, calls_rx)
    }

    /// Queue events delivered up front to the next opened call
    pub fn with_script(self, events: Vec<TransportEvent>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(events);
        self
    }

    /// Number of calls opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl RpcChannel for MockChannel {
    fn open_stream(&self, call: &CallPath) -> StreamHandle {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(script.len() + MOCK_BUFFER);
        for event in script {
            // Capacity covers the whole script
            let _ = tx.try_send(event);
        }

        let handle = StreamHandle::new(call.clone(), rx);
        self.opened.fetch_add(1, Ordering::SeqCst);
        let _ = self.calls_tx.send(MockCall {
            call: call.clone(),
            stream_id: handle.id(),
            events: tx,
        });
        handle
    }
}
