//! IPC Protocol definitions for daemon-UI communication
//!
//! JSON-RPC style requests travel from the UI to the daemon, one per line.
//! The daemon answers with [`Frame`]s: responses to those requests, and
//! stream events pushed whenever a triggered stream produces something.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::relay::StreamEvent;

/// JSON-RPC style request. None of the methods take parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub method: String,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
        }
    }
}

/// JSON-RPC style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Uuid, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Uuid, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn ok(id: Uuid) -> Self {
        Self::success(id, serde_json::json!({"ok": true}))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// One line sent from the daemon to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Response(Response),
    Event(StreamEvent),
}

impl From<Response> for Frame {
    fn from(response: Response) -> Self {
        Frame::Response(response)
    }
}

impl From<StreamEvent> for Frame {
    fn from(event: StreamEvent) -> Self {
        Frame::Event(event)
    }
}

// Error codes
pub const ERR_PARSE: i32 = -32700;
pub const ERR_INVALID_REQUEST: i32 = -32600;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INTERNAL: i32 = -32603;

// Method names
pub mod methods {
    pub const PING: &str = "ping";
    pub const STATUS: &str = "status";

    /// Start one stream; results arrive as event frames
    pub const STREAM_TRIGGER: &str = "stream.trigger";
}

// Response structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: u64,
    pub active_streams: usize,
    pub endpoint: String,
    pub call: String,
}
