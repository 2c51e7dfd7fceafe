//! Bridge between the privileged daemon and the isolated UI.
//!
//! [`Bridge`] stays on the privileged side and owns the channel. The UI only
//! ever reaches a [`BridgeSurface`], whose single operation starts a stream
//! and returns nothing; results travel through the sink it was built with.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::{
    relay, CancelHandle, ForwardSink, LogSink, Sink, StreamEvent, StreamId, StreamOutcome,
};
use crate::rpc::{registry, CallPath, RpcChannel};
use crate::Result;

/// Privileged half: opens streams and runs their relays
pub struct Bridge {
    channel: Arc<dyn RpcChannel>,
    call: CallPath,
    shutdown: CancelHandle,
    active: Arc<AtomicUsize>,
}

impl Bridge {
    pub fn new(channel: Arc<dyn RpcChannel>, call: CallPath) -> Self {
        Self {
            channel,
            call,
            shutdown: CancelHandle::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build on the channel installed for this process
    pub fn from_registry(call: CallPath) -> Result<Self> {
        Ok(Self::new(registry::current()?, call))
    }

    pub fn call(&self) -> &CallPath {
        &self.call
    }

    /// Streams currently being relayed
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Open a new stream and relay it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch<F>(&self, make_sink: F) -> StreamId
    where
        F: FnOnce(StreamId) -> Arc<dyn Sink>,
    {
        let handle = self.channel.open_stream(&self.call);
        let id = handle.id();
        let sink = make_sink(id);
        let cancel = self.shutdown.token();
        let active = self.active.clone();

        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            relay(handle, sink.as_ref(), cancel).await;
            active.fetch_sub(1, Ordering::SeqCst);
        });

        debug!(stream_id = %id, call = %self.call, "Stream launched");
        id
    }

    /// Open a new stream and relay it to completion on the current task
    pub async fn run<F>(&self, make_sink: F) -> StreamOutcome
    where
        F: FnOnce(StreamId) -> Arc<dyn Sink>,
    {
        let handle = self.channel.open_stream(&self.call);
        let sink = make_sink(handle.id());

        self.active.fetch_add(1, Ordering::SeqCst);
        let outcome = relay(handle, sink.as_ref(), self.shutdown.token()).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    /// Cancel every in-flight stream. Streams launched afterwards fail at once.
    pub fn shutdown(&self) {
        debug!(active = self.active_streams(), "Bridge shutting down");
        self.shutdown.cancel();
    }
}

pub type SinkFactory = Arc<dyn Fn(StreamId) -> Arc<dyn Sink> + Send + Sync>;

/// The one capability exposed across the privilege boundary
#[derive(Clone)]
pub struct BridgeSurface {
    bridge: Arc<Bridge>,
    make_sink: SinkFactory,
}

impl BridgeSurface {
    pub fn new<F>(bridge: Arc<Bridge>, make_sink: F) -> Self
    where
        F: Fn(StreamId) -> Arc<dyn Sink> + Send + Sync + 'static,
    {
        Self {
            bridge,
            make_sink: Arc::new(make_sink),
        }
    }

    /// Surface whose streams are only logged
    pub fn logging(bridge: Arc<Bridge>) -> Self {
        Self::new(bridge, |id| Arc::new(LogSink::new(id)) as Arc<dyn Sink>)
    }

    /// Surface forwarding every event, errors included, into `tx`
    pub fn forwarding<T>(bridge: Arc<Bridge>, tx: mpsc::UnboundedSender<T>) -> Self
    where
        T: From<StreamEvent> + Send + 'static,
    {
        Self::new(bridge, move |id| {
            Arc::new(ForwardSink::new(id, tx.clone())) as Arc<dyn Sink>
        })
    }

    /// Start one stream. Fire-and-forget: no handle and no data come back.
    ///
    /// Must be called from within a tokio runtime; the relay is spawned onto it.
    pub fn trigger_stream(&self) {
        let make_sink = self.make_sink.clone();
        self.bridge.launch(move |id| make_sink(id));
    }
}
