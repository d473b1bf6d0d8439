//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `handshake` binary)

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HandshakeError, Result};
use crate::protocol::{
    default_versions, AcceptPolicy, Handshake, Magic, NetworkPolicy, VersionNumber,
    VersionTable, MAINNET_MAGIC,
};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Acceptance policy configuration
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| HandshakeError::Config(format!("Failed to read config file: {e}")))?;

        Ok(toml::from_str(&content)?)
    }

    /// Default config file location (`<config dir>/handshake/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("handshake").join("config.toml"))
    }

    /// Load from the default location if present, else defaults
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment variable overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(magic) = std::env::var("HANDSHAKE_MAGIC") {
            if let Ok(magic) = magic.parse() {
                self.network.magic = magic;
            }
        }
        if let Ok(listen) = std::env::var("HANDSHAKE_LISTEN") {
            self.transport.listen = listen;
        }
        if let Ok(timeout) = std::env::var("HANDSHAKE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse() {
                self.transport.timeout_secs = timeout;
            }
        }

        self
    }

    /// Local version table for the configured network
    pub fn versions(&self) -> VersionTable {
        default_versions(self.network.magic)
    }

    /// Acceptance policy built from the `[policy]` section
    pub fn policy(&self) -> Arc<dyn AcceptPolicy> {
        let mut policy = NetworkPolicy::new()
            .with_refused_versions(self.policy.refused_versions.iter().copied());
        if self.policy.enforce_magic {
            policy = policy.with_magic_check();
        }
        Arc::new(policy)
    }

    /// Create a handshake for one connection attempt
    pub fn handshake(&self) -> Result<Handshake> {
        Ok(Handshake::new(self.versions())?.with_policy(self.policy()))
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network magic
    pub magic: Magic,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            magic: MAINNET_MAGIC,
        }
    }
}

/// Acceptance policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Refuse peers whose parameters carry a different magic
    #[serde(default)]
    pub enforce_magic: bool,

    /// Versions to refuse even when both sides support them
    #[serde(default)]
    pub refused_versions: Vec<VersionNumber>,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address to listen on
    pub listen: String,

    /// Maximum frame size in bytes
    pub max_frame_size: usize,

    /// Seconds to wait for the peer's message
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".to_string(),
            max_frame_size: 64 * 1024,
            timeout_secs: 10,
        }
    }
}
