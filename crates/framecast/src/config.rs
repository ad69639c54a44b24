//! Server configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default upload cap: 512 MiB, enough for a full-length MJPEG clip
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Configuration for the framecast server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the HTTP/WebSocket listener to
    pub host: String,

    /// Port to bind to (0 = ephemeral, picked by the OS)
    pub port: u16,

    /// Origins allowed to open the signaling channel (empty = allow all)
    pub allowed_origins: Vec<String>,

    /// Directory for uploaded asset blobs
    pub storage_dir: PathBuf,

    /// Prefix prepended to blob keys inside the storage directory
    pub storage_key_prefix: String,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,

    /// Maximum accepted upload body size in bytes
    pub max_upload_bytes: usize,

    /// Delay between frame sends in milliseconds (None = unpaced)
    pub frame_interval_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            storage_dir: PathBuf::from("temp_videos"),
            storage_key_prefix: String::new(),
            max_sessions: 0,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            frame_interval_ms: None,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }

        if self.storage_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "storage_dir must not be empty".to_string(),
            ));
        }

        if self.allowed_origins.iter().any(|o| o.is_empty()) {
            return Err(Error::InvalidConfig(
                "allowed_origins entries must not be empty".to_string(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        if self.frame_interval_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "frame_interval_ms must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Address string to bind the listener to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Optional pacing interval for the streaming loop
    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert_eq!(config.frame_interval(), None);
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = ServerConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_storage_dir_rejected() {
        let config = ServerConfig {
            storage_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_origin_entry_rejected() {
        let config = ServerConfig {
            allowed_origins: vec![String::new()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_upload_cap_rejected() {
        let config = ServerConfig {
            max_upload_bytes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_frame_interval_rejected() {
        let config = ServerConfig {
            frame_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_frame_interval_conversion() {
        let config = ServerConfig {
            frame_interval_ms: Some(33),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(33)));
    }
}
