//! Configuration loading, resolution and validation
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CHATGUARD_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error (warning + defaults). A TOML file that
//! exists but cannot be parsed is. The resolved settings are validated once
//! into an immutable [`MonitorConfig`] that is passed to session construction.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ENV_CONFIG_FILE: &str = "CHATGUARD_CONFIG";
pub const ENV_SERVER_URL: &str = "CHATGUARD_SERVER_URL";
pub const ENV_WINDOW_SIZE: &str = "CHATGUARD_WINDOW_SIZE";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CHATGUARD_REQUEST_TIMEOUT_SECS";
pub const ENV_LOGS_DIR: &str = "CHATGUARD_LOGS_DIR";
pub const ENV_EXPORT_DIR: &str = "CHATGUARD_EXPORT_DIR";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// On-disk configuration file model
///
/// All fields are optional; anything left out falls through to the compiled
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server_url: Option<String>,
    pub window_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub completion_queue_capacity: Option<usize>,
    pub analysis_workers: Option<usize>,
    pub shutdown_grace_ms: Option<u64>,
    pub logs_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub parties: Option<Vec<String>>,
    pub logging: LoggingConfig,
}

/// Compiled-in defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub server_url: String,
    pub window_size: usize,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub completion_queue_capacity: usize,
    pub analysis_workers: usize,
    pub shutdown_grace: Duration,
    pub logs_dir: PathBuf,
    pub export_dir: PathBuf,
    pub parties: Vec<String>,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            window_size: 3,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            completion_queue_capacity: 64,
            analysis_workers: 2,
            shutdown_grace: Duration::from_millis(2000),
            logs_dir: default_logs_dir(),
            export_dir: PathBuf::from("."),
            parties: vec!["Alice".to_string(), "Bob".to_string()],
            log_level: default_log_level(),
        }
    }
}

/// OS-dependent default location for alert partitions
fn default_logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chatguard").join("monitoring_logs"))
        .unwrap_or_else(|| PathBuf::from("./monitoring_logs"))
}

/// Default configuration file path (`<config_dir>/chatguard/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chatguard").join("config.toml"))
}

/// Immutable, validated session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Base URL of the sentiment classifier
    pub server_url: String,
    /// Messages per analysis window (>= 1)
    pub window_size: usize,
    /// Bound on a single classifier call
    pub request_timeout: Duration,
    /// Cadence at which the owner drains completed analyses
    pub poll_interval: Duration,
    /// Capacity of the completion queue between bridge and owner
    pub completion_queue_capacity: usize,
    /// Worker threads in the analysis runtime
    pub analysis_workers: usize,
    /// How long bridge shutdown waits for in-flight calls
    pub shutdown_grace: Duration,
    /// Directory holding `alerts_YYYYMMDD.json` partitions
    pub logs_dir: PathBuf,
    /// Directory receiving export reports
    pub export_dir: PathBuf,
    /// Parties shown on the status board before they speak
    pub parties: Vec<String>,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let d = CompiledDefaults::for_current_platform();
        Self {
            server_url: d.server_url,
            window_size: d.window_size,
            request_timeout: d.request_timeout,
            poll_interval: d.poll_interval,
            completion_queue_capacity: d.completion_queue_capacity,
            analysis_workers: d.analysis_workers,
            shutdown_grace: d.shutdown_grace,
            logs_dir: d.logs_dir,
            export_dir: d.export_dir,
            parties: d.parties,
            log_level: d.log_level,
        }
    }
}

impl MonitorConfig {
    /// Reject settings a session cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 1 {
            return Err(Error::Config("window_size must be at least 1".to_string()));
        }
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(Error::Config("server_url must not be empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "server_url must be an http(s) URL: {}",
                url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request timeout must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }
        if self.completion_queue_capacity == 0 {
            return Err(Error::Config(
                "completion_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.analysis_workers == 0 {
            return Err(Error::Config("analysis_workers must be at least 1".to_string()));
        }
        if self.parties.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::Config("party names must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub window_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub logs_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Resolves a [`MonitorConfig`] from CLI, environment, TOML file and defaults
pub struct ConfigResolver {
    config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// `config_path` comes from the CLI; when absent, `CHATGUARD_CONFIG` and
    /// then the platform default path are tried.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    fn config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var(ENV_CONFIG_FILE) {
            return Some(PathBuf::from(path));
        }
        default_config_path()
    }

    /// Read the TOML tier, treating a missing file as empty
    fn load_file_tier(&self) -> Result<TomlConfig> {
        let Some(path) = self.config_file() else {
            debug!("No config directory on this platform, using defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            // An explicitly requested file that is missing is still only a warning
            warn!(
                "Config file not found: {} (using defaults)",
                path.display()
            );
            return Ok(TomlConfig::default());
        }

        let config = load_toml_config(&path)?;
        info!("Loaded config file: {}", path.display());
        Ok(config)
    }

    pub fn resolve(&self, overrides: &ConfigOverrides) -> Result<MonitorConfig> {
        let file = self.load_file_tier()?;
        let d = CompiledDefaults::for_current_platform();

        let server_url = overrides
            .server_url
            .clone()
            .or_else(|| std::env::var(ENV_SERVER_URL).ok())
            .or(file.server_url)
            .unwrap_or(d.server_url);

        let window_size = match overrides.window_size {
            Some(n) => n,
            None => env_parse::<usize>(ENV_WINDOW_SIZE)?
                .or(file.window_size)
                .unwrap_or(d.window_size),
        };

        let request_timeout = match overrides.request_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => env_parse::<u64>(ENV_REQUEST_TIMEOUT_SECS)?
                .or(file.request_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(d.request_timeout),
        };

        let logs_dir = overrides
            .logs_dir
            .clone()
            .or_else(|| std::env::var(ENV_LOGS_DIR).ok().map(PathBuf::from))
            .or(file.logs_dir)
            .unwrap_or(d.logs_dir);

        let export_dir = overrides
            .export_dir
            .clone()
            .or_else(|| std::env::var(ENV_EXPORT_DIR).ok().map(PathBuf::from))
            .or(file.export_dir)
            .unwrap_or(d.export_dir);

        let config = MonitorConfig {
            server_url,
            window_size,
            request_timeout,
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.poll_interval),
            completion_queue_capacity: file
                .completion_queue_capacity
                .unwrap_or(d.completion_queue_capacity),
            analysis_workers: file.analysis_workers.unwrap_or(d.analysis_workers),
            shutdown_grace: file
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(d.shutdown_grace),
            logs_dir,
            export_dir,
            parties: file.parties.unwrap_or(d.parties),
            log_level: file.logging.level,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Parse an optional numeric environment variable
fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid number: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_size, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.parties, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_zero_window_size_rejected() {
        let config = MonitorConfig {
            window_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_non_http_server_url_rejected() {
        let config = MonitorConfig {
            server_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let config = MonitorConfig {
            completion_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_party_rejected() {
        let config = MonitorConfig {
            parties: vec!["Alice".to_string(), "  ".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file_parses() {
        let parsed: TomlConfig = toml::from_str(
            r#"
            window_size = 5
            parties = ["Carol"]

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.window_size, Some(5));
        assert_eq!(parsed.parties, Some(vec!["Carol".to_string()]));
        assert_eq!(parsed.logging.level, "debug");
        assert!(parsed.server_url.is_none());
    }
}
