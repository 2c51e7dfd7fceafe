//! IPC Client for connecting to the daemon
//!
//! Used by the UI side. One-shot calls go through [`DaemonClient`]; a
//! [`BridgeConnection`] stays open to trigger streams and receive their events.

use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;
use uuid::Uuid;

use super::protocol::*;
use crate::{Error, Result};

/// Client for communicating with the daemon
#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Create a new daemon client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Check if daemon is running by sending a ping
    pub async fn ping(&self) -> Result<bool> {
        match self.call(methods::PING).await {
            Ok(result) => Ok(serde_json::from_value::<PingResponse>(result)
                .map(|pong| pong.ok)
                .unwrap_or(false)),
            Err(_) => Ok(false),
        }
    }

    /// Get daemon status
    pub async fn status(&self) -> Result<StatusResponse> {
        let result = self.call(methods::STATUS).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Open a long-lived connection for triggering streams
    pub async fn connect(&self) -> Result<BridgeConnection> {
        BridgeConnection::open(&self.socket_path).await
    }

    /// Send a request on a fresh connection and wait for its response
    async fn call(&self, method: &str) -> Result<serde_json::Value> {
        let mut conn = self.connect().await?;
        conn.request(method).await
    }
}

/// Open connection to the daemon. Receives the events of every stream it triggered.
pub struct BridgeConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// Events read while waiting for a response
    queued: VecDeque<StreamEvent>,
}

impl BridgeConnection {
    async fn open(socket_path: &std::path::Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to connect to daemon at {}: {}. Is the daemon running?",
                socket_path.display(),
                e
            ))
        })?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
            queued: VecDeque::new(),
        })
    }

    /// Ask the daemon to start one stream. Its results arrive via [`Self::next_event`].
    pub async fn trigger_stream(&mut self) -> Result<()> {
        self.request(methods::STREAM_TRIGGER).await?;
        Ok(())
    }

    /// Next stream event, or `None` once the daemon closed the connection
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        if let Some(event) = self.queued.pop_front() {
            return Ok(Some(event));
        }

        loop {
            match self.read_frame().await? {
                Some(Frame::Event(event)) => return Ok(Some(event)),
                Some(Frame::Response(response)) => {
                    debug!("Ignoring unsolicited response (id: {})", response.id);
                }
                None => return Ok(None),
            }
        }
    }

    pub(crate) async fn request(&mut self, method: &str) -> Result<serde_json::Value> {
        let request = Request::new(method);
        let id = request.id;
        let request_json = serde_json::to_string(&request)?;

        self.writer.write_all(request_json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        self.wait_response(id).await
    }

    async fn wait_response(&mut self, id: Uuid) -> Result<serde_json::Value> {
        loop {
            match self.read_frame().await? {
                Some(Frame::Response(response)) if response.id == id => {
                    if let Some(error) = response.error {
                        return Err(Error::Rpc {
                            code: error.code,
                            message: error.message,
                        });
                    }
                    return response
                        .result
                        .ok_or_else(|| Error::Other("Empty response".to_string()));
                }
                Some(Frame::Response(response)) => {
                    debug!("Ignoring response for another request (id: {})", response.id);
                }
                Some(Frame::Event(event)) => self.queued.push_back(event),
                None => {
                    return Err(Error::Other(
                        "Daemon closed the connection before responding".to_string(),
                    ))
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(serde_json::from_str(&line)?)),
            None => Ok(None),
        }
    }
}

/// Check if daemon is reachable
pub async fn is_daemon_running(socket_path: &std::path::Path) -> bool {
    let client = DaemonClient::new(socket_path.to_path_buf());
    client.ping().await.unwrap_or(false)
}
