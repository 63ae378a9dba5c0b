use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub playlist: PlaylistConfig,
    pub keyframes: KeyframeConfig,
    pub decision: DecisionConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
    pub file_path: Option<String>,
    /// Per-target levels, e.g. `cuepoint_core::service::playback: debug`
    pub targets: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
            targets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session without a heartbeat for this long is lapsed
    pub liveness_window_secs: u64,
    /// Lapsed sessions and stopped tombstones are forgotten after this long
    pub reap_after_secs: u64,
    /// Reaper period, 0 disables the reaper
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 60,
            reap_after_secs: 600,
            reap_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    #[must_use]
    pub const fn reap_after(&self) -> Duration {
        Duration::from_secs(self.reap_after_secs)
    }

    #[must_use]
    pub const fn reap_interval(&self) -> Option<Duration> {
        if self.reap_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reap_interval_secs))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Entries pulled per catalog request for lazily materialized playlists
    pub library_window: usize,
    /// Upper bound for a single chunk request
    pub max_chunk_limit: usize,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            library_window: 100,
            max_chunk_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// GOP duration reported for the last keyframe of an index
    pub default_last_gop_ms: u64,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            default_last_gop_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Base URL playback URLs are built from
    pub base_url: String,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON catalog document; an empty catalog is used when unset
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (CUEPOINT_SESSION__REAP_AFTER_SECS, etc.)
        builder = builder.add_source(
            Environment::with_prefix("CUEPOINT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every section, returning all problems at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        for (target, level) in &self.logging.targets {
            if crate::logging::parse_log_level(level).is_err() {
                errors.push(format!(
                    "logging.targets.{target} has invalid level \"{level}\""
                ));
            }
        }

        if self.session.liveness_window_secs == 0 {
            errors.push("session.liveness_window_secs must be greater than 0".to_string());
        }
        if self.session.reap_after_secs < self.session.liveness_window_secs {
            errors.push(
                "session.reap_after_secs must not be shorter than session.liveness_window_secs"
                    .to_string(),
            );
        }

        if self.playlist.library_window == 0 {
            errors.push("playlist.library_window must be greater than 0".to_string());
        }
        if self.playlist.max_chunk_limit == 0 {
            errors.push("playlist.max_chunk_limit must be greater than 0".to_string());
        }

        if self.keyframes.default_last_gop_ms == 0 {
            errors.push("keyframes.default_last_gop_ms must be greater than 0".to_string());
        }

        if !(self.decision.base_url.starts_with("http://")
            || self.decision.base_url.starts_with("https://"))
        {
            errors.push(format!(
                "decision.base_url must be an http(s) URL, got \"{}\"",
                self.decision.base_url
            ));
        }

        if let Some(path) = &self.catalog.path {
            if !Path::new(path).exists() {
                errors.push(format!("catalog.path \"{path}\" does not exist"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
