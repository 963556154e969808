//! Configuration for the capture and index-search engines.
//!
//! Every engine is constructed from a [`Config`]; nothing is read from process-wide
//! state after construction. The configuration is stored as TOML and supports
//! environment variable overrides.
//!
//! ## Configuration Hierarchy
//!
//! 1. **Defaults**: the public Wayback Machine endpoints
//! 2. **Config file**: platform-specific config directory (see [`Config::load`])
//! 3. **Environment variables**: `WAYBACK_*` prefix
//!
//! ## Example Configuration File
//!
//! ```toml
//! [endpoints]
//! archive_base = "https://web.archive.org"
//! cdx = "https://web.archive.org/cdx/search/cdx"
//! save = "https://web.archive.org/save"
//!
//! [client]
//! user_agent = "my-archiver/1.0 (ops@example.com)"
//! timeout_secs = 180
//!
//! [transport]
//! retries = 5
//! backoff_base_ms = 500
//!
//! [capture]
//! max_tries = 8
//!
//! [cdx]
//! limit = 25000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str =
    concat!("wayback/", env!("CARGO_PKG_VERSION"), " (+https://github.com/wayback-rs/wayback)");

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service endpoints.
    pub endpoints: EndpointsConfig,
    /// HTTP client identity and timeouts.
    pub client: ClientConfig,
    /// Transport-level retry policy.
    pub transport: TransportConfig,
    /// Capture orchestrator settings.
    pub capture: CaptureConfig,
    /// Index query settings.
    pub cdx: CdxConfig,
}

/// Base URLs of the archive service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Prefix for archive URLs: `<archive_base>/web/<timestamp>/<url>`.
    pub archive_base: String,
    /// CDX index search endpoint.
    pub cdx: String,
    /// Save Page Now endpoint; the target URL is appended after a `/`.
    pub save: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            archive_base: "https://web.archive.org".to_string(),
            cdx: "https://web.archive.org/cdx/search/cdx".to_string(),
            save: "https://web.archive.org/save".to_string(),
        }
    }
}

/// HTTP client identity and per-request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds. Captures can take minutes on the server side.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 180,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy for transient HTTP failures (connection errors, 500/502/503/504).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Retries after the first request; total attempts are `retries + 1`.
    pub retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay.
    pub backoff_max_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 120_000,
        }
    }
}

impl TransportConfig {
    /// Backoff before retry number `retry` (0-based): `base * 2^retry`, capped.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

/// Capture orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture attempts before giving up with a diagnostic error.
    pub max_tries: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { max_tries: 8 }
    }
}

/// Index query settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdxConfig {
    /// Records per response in resume-key mode, unless the query sets its own limit.
    pub limit: u64,
}

impl Default for CdxConfig {
    fn default() -> Self {
        Self { limit: 25_000 }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if no file exists.
    ///
    /// The file lives at:
    /// - Linux: `~/.config/wayback/config.toml`
    /// - macOS: `~/Library/Application Support/rs.wayback.wayback/config.toml`
    /// - Windows: `%APPDATA%\wayback\wayback\config\config.toml`
    ///
    /// Environment overrides are applied in both cases.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined, or the file
    /// exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Load configuration from an explicit file and apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Save the configuration to the default location, creating parent directories.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save the configuration to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Config("Invalid config path".into()))?;

        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Override values from `WAYBACK_*` environment variables.
    ///
    /// - `WAYBACK_USER_AGENT`
    /// - `WAYBACK_ARCHIVE_BASE`
    /// - `WAYBACK_CDX_ENDPOINT`
    /// - `WAYBACK_SAVE_ENDPOINT`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(agent) = non_empty("WAYBACK_USER_AGENT") {
            self.client.user_agent = agent;
        }
        if let Some(base) = non_empty("WAYBACK_ARCHIVE_BASE") {
            self.endpoints.archive_base = base;
        }
        if let Some(cdx) = non_empty("WAYBACK_CDX_ENDPOINT") {
            self.endpoints.cdx = cdx;
        }
        if let Some(save) = non_empty("WAYBACK_SAVE_ENDPOINT") {
            self.endpoints.save = save;
        }
    }

    /// Archive base without a trailing slash.
    #[must_use]
    pub fn archive_base(&self) -> &str {
        self.endpoints.archive_base.trim_end_matches('/')
    }

    fn config_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("rs", "wayback", "wayback")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }
}
