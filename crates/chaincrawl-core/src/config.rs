//! Crawler configuration.
//!
//! Loaded from a YAML file in which `${VAR}` placeholders are replaced with
//! environment values before parsing. Accessors fail fast with a descriptive
//! [`ConfigError`] when a required value is missing, so a misconfigured
//! crawler never starts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::AbiHandle;
use crate::engine::CrawlSettings;
use crate::error::CrawlError;
use crate::retry::RetryPolicy;
use crate::types::TrackedContract;

/// Errors raised while loading or reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing configuration value: {key}")]
    Missing { key: String },

    #[error("Invalid configuration value {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Cannot load ABI {path}: {reason}")]
    Abi { path: String, reason: String },
}

impl ConfigError {
    fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for CrawlError {
    fn from(e: ConfigError) -> Self {
        CrawlError::Config(e.to_string())
    }
}

// ─── Environment substitution ────────────────────────────────────────────────

/// Replace every `${NAME}` in `input` with `lookup(NAME)`.
///
/// Unknown variables become empty strings. Text that does not form a
/// well-formed placeholder is kept as is.
pub fn substitute_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if is_var_name(&after[..end]) => {
                if let Some(value) = lookup(&after[..end]) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_var_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlsConfig {
    /// Base URL of the ledger API.
    #[serde(default)]
    pub api: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// File path or `sqlite:` URL.
    pub url: String,
}

/// Retry settings for ledger API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry `n` waits `n * delay_ms`.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_max_retries() -> u32 { 3 }
fn default_delay_ms() -> u64 { 1_000 }
fn default_request_timeout_ms() -> u64 { 30_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `"info,chaincrawl_http=debug"`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

// ─── CrawlerConfig ───────────────────────────────────────────────────────────

fn default_poll_interval_ms() -> u64 { 6_000 }
fn default_error_backoff_ms() -> u64 { 6_000 }

/// Top-level crawler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default)]
    pub urls: UrlsConfig,
    #[serde(default)]
    pub batch_size: Option<u64>,
    /// Sleep after an address is caught up.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause before the next cycle after an address failed.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// contract name → ABI file paths (the first one is used)
    #[serde(default)]
    pub abi: BTreeMap<String, Vec<String>>,
    /// contract name → bound addresses
    #[serde(default)]
    pub wallet: BTreeMap<String, Vec<String>>,
    /// contract name → tracked event names (default: all ABI events)
    #[serde(default)]
    pub events: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Directory relative ABI paths are resolved against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl CrawlerConfig {
    /// Load a YAML file, substituting `${VAR}`s from the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&substitute_env(&content, |k| std::env::var(k).ok()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), contracts = config.abi.len(), "config loaded");
        Ok(config)
    }

    /// Parse an already-substituted YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn api_url(&self) -> Result<&str, ConfigError> {
        self.urls
            .api
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::missing("urls.api"))
    }

    pub fn contract_abi_path(&self, contract: &str) -> Result<PathBuf, ConfigError> {
        let key = format!("abi.{contract}");
        let raw = self
            .abi
            .get(contract)
            .and_then(|paths| paths.first())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::missing(&key))?;
        let path = PathBuf::from(raw);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }

    pub fn contract_addresses(&self, contract: &str) -> Result<&[String], ConfigError> {
        let key = format!("wallet.{contract}");
        let addresses = self
            .wallet
            .get(contract)
            .ok_or_else(|| ConfigError::missing(&key))?;
        if addresses.is_empty() || addresses.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::invalid(key, "address list is empty or has blank entries"));
        }
        Ok(addresses)
    }

    pub fn batch_size(&self) -> Result<u64, ConfigError> {
        match self.batch_size {
            None => Err(ConfigError::missing("batchSize")),
            Some(0) => Err(ConfigError::invalid("batchSize", "must be at least 1")),
            Some(n) => Ok(n),
        }
    }

    pub fn sqlite_url(&self) -> Result<&str, ConfigError> {
        self.database
            .sqlite
            .as_ref()
            .map(|s| s.url.as_str())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::missing("database.sqlite.url"))
    }

    /// Names of the configured contracts, sorted.
    pub fn contract_names(&self) -> Vec<String> {
        self.abi.keys().cloned().collect()
    }

    /// Load the contract's ABI and assemble its tracking description.
    pub fn tracked_contract(&self, contract: &str) -> Result<TrackedContract, ConfigError> {
        let abi = AbiHandle::load(self.contract_abi_path(contract)?)?;
        let addresses = self.contract_addresses(contract)?.to_vec();
        let tracked_events = match self.events.get(contract) {
            Some(events) => events.clone(),
            None => abi.event_identifiers.clone(),
        };
        if tracked_events.is_empty() {
            return Err(ConfigError::invalid(
                format!("events.{contract}"),
                "no events to track",
            ));
        }
        tracing::info!(
            contract,
            abi = %abi.name,
            addresses = addresses.len(),
            events = tracked_events.len(),
            "tracked contract configured"
        );
        Ok(TrackedContract::new(contract, abi, addresses, tracked_events))
    }

    pub fn crawl_settings(&self) -> Result<CrawlSettings, ConfigError> {
        Ok(CrawlSettings {
            batch_size: self.batch_size()?,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry.max_retries,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.retry.request_timeout_ms)
    }
}
