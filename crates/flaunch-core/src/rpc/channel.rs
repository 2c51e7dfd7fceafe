//! RPC channel to the backend service
//!
//! A channel opens server-streaming calls and hands back a [`StreamHandle`]
//! immediately. Nothing here fails synchronously: an unreachable endpoint or a
//! reset connection shows up later as a [`TransportEvent::Error`] on the handle.

use std::time::Duration;

use tokio::sync::mpsc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use super::endpoint::{CallPath, ServiceEndpoint};
use super::proto::Script;
use crate::config::RpcConfig;
use crate::relay::StreamHandle;
use crate::Result;

/// Raw event produced by the transport for one call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Script),
    End,
    Error(TransportError),
}

impl TransportEvent {
    pub fn message(name: impl Into<String>) -> Self {
        TransportEvent::Message(Script::named(name))
    }

    pub fn error(message: impl Into<String>) -> Self {
        TransportEvent::Error(TransportError::new(message))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// gRPC status code name, when the error came from a status
    pub code: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: &tonic::Status) -> Self {
        let message = if status.message().is_empty() {
            status.code().description().to_string()
        } else {
            status.message().to_string()
        };
        Self {
            code: Some(format!("{:?}", status.code())),
            message,
        }
    }
}

/// Opens server-streaming calls against one backend
pub trait RpcChannel: Send + Sync {
    /// Issue `call` and return its handle in the `Connecting` state
    fn open_stream(&self, call: &CallPath) -> StreamHandle;
}

/// tonic-backed channel. The connection is established lazily on the first call.
pub struct GrpcChannel {
    endpoint: ServiceEndpoint,
    channel: Channel,
    buffer: usize,
}

impl GrpcChannel {
    pub fn new(endpoint: ServiceEndpoint, connect_timeout: Duration, buffer: usize) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.as_str().to_string())?
            .connect_timeout(connect_timeout)
            .connect_lazy();

        Ok(Self {
            endpoint,
            channel,
            buffer: buffer.max(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let endpoint = ServiceEndpoint::parse(&config.endpoint)?;
        Self::new(endpoint, config.connect_timeout(), config.buffer)
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }
}

impl RpcChannel for GrpcChannel {
    /// Must be called from within a tokio runtime.
    fn open_stream(&self, call: &CallPath) -> StreamHandle {
        let (tx, rx) = mpsc::channel(self.buffer);
        let handle = StreamHandle::new(call.clone(), rx);

        let channel = self.channel.clone();
        let path = call.path();
        let stream_id = handle.id();
        tokio::spawn(async move {
            let terminal = tokio::select! {
                _ = tx.closed() => None,
                terminal = pump(channel, path, &tx) => Some(terminal),
            };
            match terminal {
                // The handle may already be gone
                Some(terminal) => {
                    let _ = tx.send(terminal).await;
                }
                None => debug!(%stream_id, "stream handle released, dropping call"),
            }
        });

        handle
    }
}

/// Forward every message of the call and return the terminal event
async fn pump(channel: Channel, path: String, tx: &mpsc::Sender<TransportEvent>) -> TransportEvent {
    let mut streaming = match open_call(channel, path).await {
        Ok(streaming) => streaming,
        Err(status) => return TransportEvent::Error(TransportError::from_status(&status)),
    };

    loop {
        match streaming.message().await {
            Ok(Some(script)) => {
                if tx.send(TransportEvent::Message(script)).await.is_err() {
                    return TransportEvent::End;
                }
            }
            Ok(None) => return TransportEvent::End,
            Err(status) => return TransportEvent::Error(TransportError::from_status(&status)),
        }
    }
}

async fn open_call(channel: Channel, path: String) -> std::result::Result<Streaming<Script>, tonic::Status> {
    let path = PathAndQuery::try_from(path)
        .map_err(|e| tonic::Status::invalid_argument(e.to_string()))?;

    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| tonic::Status::unavailable(format!("Service was not ready: {}", e)))?;

    let codec: ProstCodec<(), Script> = ProstCodec::default();
    let response = grpc
        .server_streaming(tonic::Request::new(()), path, codec)
        .await?;
    Ok(response.into_inner())
}
