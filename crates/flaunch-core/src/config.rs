use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (holds the IPC socket)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level, used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Backend service the daemon streams from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Service address, e.g. "http://[::1]:50051"
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Fully qualified server-streaming call, "package.Service/Method"
    #[serde(default = "default_call")]
    pub call: String,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Events buffered per stream before the transport is back-pressured
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            call: default_call(),
            connect_timeout_secs: default_connect_timeout(),
            buffer: default_buffer(),
        }
    }
}

impl RpcConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flaunch")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint() -> String {
    // Address the script engine daemon binds to
    "http://[::1]:50051".to_string()
}

fn default_call() -> String {
    "flaunch.ScriptEngine/GetAll".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_buffer() -> usize {
    64
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Get the configuration file path
    /// Always uses ~/.config/flaunch/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("flaunch")
            .join("config.toml")
    }

    /// Get the Unix socket path the UI side connects to
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join("flaunch.sock")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.rpc.endpoint, "http://[::1]:50051");
        assert_eq!(config.rpc.call, "flaunch.ScriptEngine/GetAll");
        assert_eq!(config.rpc.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_partial_rpc_section() {
        let config = AppConfig::from_toml(
            r#"
            [rpc]
            endpoint = "http://127.0.0.1:6000"
            "#,
        )
        .unwrap();
        assert_eq!(config.rpc.endpoint, "http://127.0.0.1:6000");
        assert_eq!(config.rpc.buffer, 64);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[rpc\nendpoint = 1").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_socket_path_under_data_dir() {
        let mut config = AppConfig::default();
        config.general.data_dir = PathBuf::from("/tmp/flaunch-test");
        assert_eq!(
            config.socket_path(),
            PathBuf::from("/tmp/flaunch-test/flaunch.sock")
        );
    }
}
