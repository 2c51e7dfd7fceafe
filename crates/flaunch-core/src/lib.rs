pub mod bridge;
pub mod config;
pub mod error;
pub mod ipc;
pub mod relay;
pub mod rpc;

pub use bridge::{Bridge, BridgeSurface};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use ipc::{DaemonClient, DaemonServer};
