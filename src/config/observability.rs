//! Observability configuration: logging and live stats
//!
//! - Logging: level, file output, rotation
//! - Stats: TPS sampling period and window, periodic report interval

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Log Rotation
// ─────────────────────────────────────────────────────────────────────────────

/// Log file rotation strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LogRotation {
    /// Rotate log files hourly
    Hourly,
    /// Rotate log files daily (default)
    #[default]
    Daily,
    /// Never rotate - single log file
    Never,
}

impl LogRotation {
    /// Parse rotation string from config
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "never" => Self::Never,
            _ => Self::Daily, // Default to daily for unknown values
        }
    }

    /// Convert to string for TOML serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Enable file logging (in addition to stdout)
    pub file_enabled: bool,
    /// Directory for log files
    pub file_dir: PathBuf,
    /// Log file rotation strategy
    pub file_rotation: LogRotation,
    /// Prefix for log file names (e.g., "relayapi" -> "relayapi.2024-01-15")
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false, // Opt-in feature
            file_dir: PathBuf::from("./logs"),
            file_rotation: LogRotation::Daily,
            file_prefix: "relayapi".to_string(),
        }
    }
}

/// Logging settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<String>,
    pub file_rotation: Option<String>,
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file
                .file_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            file_rotation: file
                .file_rotation
                .map(|s| LogRotation::parse(&s))
                .unwrap_or(defaults.file_rotation),
            file_prefix: file.file_prefix.unwrap_or(defaults.file_prefix),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Live stats sampling and reporting
#[derive(Debug, Clone, PartialEq)]
pub struct StatsConfig {
    /// TPS sampling period in milliseconds
    pub sample_interval_ms: u64,
    /// Number of TPS samples kept for the trend window
    pub window: usize,
    /// Seconds between summary log lines (0 = disabled)
    pub report_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            window: 60,
            report_interval_secs: 0,
        }
    }
}

/// Stats settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileStats {
    pub sample_interval_ms: Option<u64>,
    pub window: Option<usize>,
    pub report_interval_secs: Option<u64>,
}

impl StatsConfig {
    /// Create from file config with defaults
    ///
    /// Zero sampling period or window would stall the sampler, so both are
    /// clamped to at least 1.
    pub fn from_file(file: Option<FileStats>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            sample_interval_ms: file
                .sample_interval_ms
                .unwrap_or(defaults.sample_interval_ms)
                .max(1),
            window: file.window.unwrap_or(defaults.window).max(1),
            report_interval_secs: file
                .report_interval_secs
                .unwrap_or(defaults.report_interval_secs),
        }
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Report interval, or None when reporting is disabled
    pub fn report_period(&self) -> Option<Duration> {
        (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs))
    }
}
