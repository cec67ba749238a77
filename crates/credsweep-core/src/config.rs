//! Configuration management for credsweep.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides, plus the validated [`RunConfiguration`]
//! handed to the scanner for a single run.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Target, DEFAULT_BASE_PATH, DEFAULT_HOST};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/credsweep/config.toml` (or platform
/// equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Identity provider endpoint
    pub target: TargetConfig,
    /// Lockout-avoidance and pacing policy
    pub policy: ScanPolicy,
    /// HTTP transport settings
    pub transport: TransportConfig,
    /// Findings storage settings
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to
    /// defaults if the file is missing.
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `CREDSWEEP_DOMAIN`: Override the target tenant domain
    /// - `CREDSWEEP_HOST`: Override the endpoint host
    /// - `CREDSWEEP_DELAY_MS`: Override the inter-request delay
    /// - `CREDSWEEP_TIMEOUT_SECS`: Override the request timeout
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides looked up through `lookup` (normally the process
    /// environment). Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(domain) = lookup("CREDSWEEP_DOMAIN") {
            tracing::debug!("Override target.domain from env: {}", domain);
            self.target.domain = domain;
        }

        if let Some(host) = lookup("CREDSWEEP_HOST") {
            tracing::debug!("Override target.host from env: {}", host);
            self.target.host = host;
        }

        if let Some(val) = lookup("CREDSWEEP_DELAY_MS") {
            if let Ok(delay) = val.parse() {
                self.policy.request_delay_ms = delay;
                tracing::debug!("Override policy.request_delay_ms from env: {}", delay);
            }
        }

        if let Some(val) = lookup("CREDSWEEP_TIMEOUT_SECS") {
            if let Ok(timeout) = val.parse() {
                self.transport.timeout_secs = timeout;
                tracing::debug!("Override transport.timeout_secs from env: {}", timeout);
            }
        }
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/credsweep/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("io", "credsweep", "credsweep")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Identity provider endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Autologon endpoint host
    pub host: String,
    /// Endpoint path appended after the domain
    pub base_path: String,
    /// Tenant domain (required before a run)
    pub domain: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            domain: String::new(),
        }
    }
}

impl TargetConfig {
    /// Build the run target.
    #[must_use]
    pub fn to_target(&self) -> Target {
        Target::new(
            self.host.trim(),
            self.base_path.trim(),
            self.domain.trim(),
        )
    }
}

/// Lockout-avoidance and pacing policy for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPolicy {
    /// Consecutive `AccountLocked` outcomes that abort the run
    pub max_consecutive_lockouts: u32,
    /// Consecutive transport failures that abort the run
    pub max_consecutive_transport_failures: u32,
    /// Pause between requests in milliseconds
    pub request_delay_ms: u64,
    /// Stop testing a username once its status is resolved
    pub skip_resolved_users: bool,
    /// Usernames processed in parallel (1 = strictly sequential)
    pub max_concurrent_users: usize,
    /// Abort the run when the result sink fails
    pub fail_on_sink_error: bool,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_lockouts: 3,
            max_consecutive_transport_failures: 5,
            request_delay_ms: 1000,
            skip_resolved_users: true,
            max_concurrent_users: 1,
            fail_on_sink_error: false,
        }
    }
}

impl ScanPolicy {
    /// Inter-request delay.
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Check that thresholds are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_consecutive_lockouts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.max_consecutive_lockouts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_consecutive_transport_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.max_consecutive_transport_failures".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_users == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.max_concurrent_users".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("credsweep/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Findings storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database for findings; `None` disables persistence
    pub database_path: Option<PathBuf>,
    /// Persist confirmed passwords alongside findings
    pub record_passwords: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            record_passwords: true,
        }
    }
}

/// Username or password input: one literal value or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    /// A single value
    Literal(String),
    /// Values in the order they should be tried
    List(Vec<String>),
}

impl Default for CredentialSource {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl CredentialSource {
    /// Whether the source yields no usable value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Literal(value) => value.trim().is_empty(),
            Self::List(values) => values.is_empty(),
        }
    }

    /// Values in order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Literal(value) => std::slice::from_ref(value),
            Self::List(values) => values,
        }
    }
}

/// Everything a single run needs, validated before any request is sent.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Endpoint under test
    pub target: Target,
    /// Usernames to test
    pub usernames: CredentialSource,
    /// Passwords to test for each username
    pub passwords: CredentialSource,
    /// Lockout-avoidance policy
    pub policy: ScanPolicy,
}

impl RunConfiguration {
    /// Fail fast on configuration that cannot produce a meaningful run.
    pub fn validate(&self) -> ConfigResult<()> {
        Target::validate_domain(&self.target.domain)?;

        if self.target.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target.host".to_string(),
                reason: "must not be blank".to_string(),
            });
        }

        if self.usernames.is_empty() && self.passwords.is_empty() {
            return Err(ConfigError::EmptyCredentialSources);
        }

        self.policy.validate()
    }
}
