//! IPC module for daemon-UI communication
//!
//! Unix socket transport carrying the bridge across the process boundary.
//! The UI side can only ping, ask for status, and trigger streams.

mod client;
mod protocol;
mod server;

pub use client::{is_daemon_running, BridgeConnection, DaemonClient};
pub use protocol::*;
pub use server::DaemonServer;
