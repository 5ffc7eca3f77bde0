//! Configuration for the relay server
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/relayapi/config.toml, or $RELAY_CONFIG)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod observability;
mod routing;
mod serialization;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (maintain public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use observability::{FileLogging, FileStats, LogRotation, LoggingConfig, StatsConfig};
pub use routing::{ClientConfig, ClientsConfig, ProviderConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8840";

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound HTTP client settings
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Deadline for response headers, and the longest gap allowed between
    /// body chunks. Streams that keep sending are never cut off.
    pub timeout_secs: u64,
    /// TCP/TLS connect timeout
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

/// Upstream settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileUpstream {
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileUpstream>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
            connect_timeout_secs: file
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the relay server to
    pub bind_addr: SocketAddr,

    /// Outbound client settings
    pub upstream: UpstreamConfig,

    /// Live stats sampling and reporting
    pub stats: StatsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Client and provider configuration
    pub clients: ClientsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8840)),
            upstream: UpstreamConfig::default(),
            stats: StatsConfig::default(),
            logging: LoggingConfig::default(),
            clients: ClientsConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,

    /// Optional [upstream] section
    pub upstream: Option<FileUpstream>,

    /// Optional [stats] section
    pub stats: Option<FileStats>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,

    /// Optional [clients.X] sections
    #[serde(default)]
    pub clients: HashMap<String, ClientConfig>,

    /// Optional [providers.X] sections
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: $RELAY_CONFIG, else ~/.config/relayapi/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RELAY_CONFIG") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::home_dir().map(|p| p.join(".config").join("relayapi").join("config.toml"))
    }

    /// Parse a config file; a missing file yields defaults
    ///
    /// A file that exists but cannot be read or parsed is an error. A broken
    /// config should fail fast, not silently fall back to defaults.
    pub(crate) fn read_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read config file {}", path.display())),
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn load() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::read_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment lookups
    pub(crate) fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // Bind address: env > file > default
        let bind = env("RELAY_BIND")
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", bind))?;

        let mut logging = LoggingConfig::from_file(file.logging);
        // Log level: env > file > default (RUST_LOG still wins at subscriber level)
        if let Some(level) = env("RELAY_LOG_LEVEL") {
            logging.level = level;
        }

        let mut stats = StatsConfig::from_file(file.stats);
        if let Some(secs) = env("RELAY_REPORT_INTERVAL").and_then(|v| v.parse().ok()) {
            stats.report_interval_secs = secs;
        }

        let clients = ClientsConfig {
            clients: file.clients,
            providers: file.providers,
        };

        Ok(Self {
            bind_addr,
            upstream: UpstreamConfig::from_file(file.upstream),
            stats,
            logging,
            clients,
        })
    }
}
