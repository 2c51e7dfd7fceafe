//! IPC Server for daemon
//!
//! Listens on Unix socket and hands each UI connection its own bridge
//! surface, wired to push stream events back over that connection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::*;
use crate::bridge::{Bridge, BridgeSurface};
use crate::config::AppConfig;
use crate::Result;

/// Maximum number of requests processed at once across all connections
const MAX_CONCURRENT_REQUESTS: usize = 10;

/// Shared by every connection
struct ServerState {
    bridge: Arc<Bridge>,
    endpoint: String,
    started_at: DateTime<Utc>,
    start_time: Instant,
    /// Semaphore to limit concurrent request processing
    request_semaphore: Semaphore,
}

/// IPC Server that handles UI connections
pub struct DaemonServer {
    state: Arc<ServerState>,
    socket_path: PathBuf,
}

impl DaemonServer {
    pub fn new(bridge: Arc<Bridge>, config: &AppConfig) -> Self {
        Self::with_socket_path(bridge, config, config.socket_path())
    }

    pub fn with_socket_path(bridge: Arc<Bridge>, config: &AppConfig, socket_path: PathBuf) -> Self {
        Self {
            state: Arc::new(ServerState {
                bridge,
                endpoint: config.rpc.endpoint.clone(),
                started_at: Utc::now(),
                start_time: Instant::now(),
                request_semaphore: Semaphore::new(MAX_CONCURRENT_REQUESTS),
            }),
            socket_path,
        }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Run the IPC server until `shutdown_rx` flips to true
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        // Remove old socket file if exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on: {}", self.socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let state = self.state.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, state).await {
                                    warn!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("IPC server shutting down");
                        break;
                    }
                }
            }
        }

        self.state.bridge.shutdown();

        // Cleanup socket file
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<ServerState>) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Responses and stream events share one outbound queue so lines never interleave
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Frame>();
    let surface = BridgeSurface::forwarding(state.bridge.clone(), frame_tx.clone());
    let writer_task = tokio::spawn(write_frames(writer, frame_rx));

    let mut result = Ok(());
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // Connection closed
            Ok(_) => {}
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }

        let response = {
            let _permit = match state.request_semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    result = Err(crate::Error::Other(format!(
                        "Failed to acquire semaphore: {}",
                        e
                    )));
                    break;
                }
            };

            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    debug!("Received request: {} (id: {})", request.method, request.id);
                    handle_request(request, &state, &surface)
                }
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    Response::error(Uuid::nil(), ERR_PARSE, format!("Parse error: {}", e))
                }
            }
        };

        if frame_tx.send(response.into()).is_err() {
            break; // Writer gone
        }
    }

    // Dropping the receiver detaches this connection's sinks, which cancels their streams
    writer_task.abort();
    debug!("UI connection closed");
    result
}

async fn write_frames(mut writer: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        let line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode frame: {}", e);
                continue;
            }
        };

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!("UI connection write failed: {}", e);
            break;
        }
    }
}

fn handle_request(request: Request, state: &ServerState, surface: &BridgeSurface) -> Response {
    let id = request.id;

    match request.method.as_str() {
        methods::PING => match serde_json::to_value(PingResponse { ok: true }) {
            Ok(value) => Response::success(id, value),
            Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
        },

        methods::STATUS => {
            let status = StatusResponse {
                running: true,
                started_at: state.started_at,
                uptime_secs: state.start_time.elapsed().as_secs(),
                active_streams: state.bridge.active_streams(),
                endpoint: state.endpoint.clone(),
                call: state.bridge.call().to_string(),
            };
            match serde_json::to_value(status) {
                Ok(value) => Response::success(id, value),
                Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
            }
        }

        methods::STREAM_TRIGGER => {
            surface.trigger_stream();
            Response::ok(id)
        }

        "" => Response::error(id, ERR_INVALID_REQUEST, "Missing method"),

        _ => Response::error(id, ERR_METHOD_NOT_FOUND, "Method not found"),
    }
}
