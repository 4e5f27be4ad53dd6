//! Configuration loading.
//!
//! A single `config.toml` under `~/.crosscontext/`. Every section is optional
//! and falls back to the values below, so an empty file (or none at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::audit::RetryPolicy;
use crate::trust::redactor::DEFAULT_SELF_ADDRESS;
use crate::types::DEFAULT_TIMEZONE;

/// Name of the config directory under the home directory.
const CONFIG_DIR_NAME: &str = ".crosscontext";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Audit log location, retry and clock.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Redaction settings.
    #[serde(default)]
    pub redaction: RedactionConfig,

    /// Result caps for queries.
    #[serde(default)]
    pub query: QueryConfig,

    /// Caller identity defaults.
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Audit log settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Log file path. Relative paths resolve against the config directory.
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,

    /// Write attempts before an invocation fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between write attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Fixed UTC offset for timestamps, in whole hours.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Timezone label recorded next to each timestamp.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            utc_offset_hours: default_utc_offset_hours(),
            timezone: default_timezone(),
        }
    }
}

impl AuditConfig {
    /// Retry policy for audit writes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// The configured offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is outside +/-23 hours.
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow::anyhow!("invalid audit.utc_offset_hours: {}", self.utc_offset_hours)
            })
    }

    /// Log path with relative paths resolved against `base`.
    pub fn resolved_path(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }
}

/// Redaction settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    /// The caller's own mail address, kept visible in recipient lists.
    #[serde(default = "default_self_address")]
    pub self_address: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            self_address: default_self_address(),
        }
    }
}

/// Query result caps.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Results returned when a query names no cap.
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,

    /// Upper bound on any requested cap.
    #[serde(default = "default_max_results_cap")]
    pub max_results_cap: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            max_results_cap: default_max_results_cap(),
        }
    }
}

/// Caller identity defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Actor recorded when a request names none.
    #[serde(default = "default_actor")]
    pub default_actor: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_actor: default_actor(),
        }
    }
}

// Default value functions for serde

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit_log.jsonl")
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    50
}
fn default_utc_offset_hours() -> i32 {
    8
}
fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_owned()
}
fn default_self_address() -> String {
    DEFAULT_SELF_ADDRESS.to_owned()
}
fn default_max_results() -> usize {
    10
}
fn default_max_results_cap() -> usize {
    50
}
fn default_actor() -> String {
    "officer_001".to_owned()
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load the config, or the defaults if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

/// Resolve the default config directory (`~/.crosscontext/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(CONFIG_DIR_NAME))
}
