//! Service settings
//!
//! Typed configuration for the credential service itself (not the provider
//! registry, which is fetched remotely). Settings load from YAML or JSON and
//! every field has a default, so an empty document is valid.
//!
//! # Example
//!
//! ```yaml
//! endpoint: https://config.internal/saml/providers
//! cache:
//!   ttl_secs: 300
//!   max_attempts: 3
//! aggregation:
//!   timeout_secs: 30
//!   max_workers: 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Top-level service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// URL of the remote provider configuration endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub aggregation: AggregationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            fetch: FetchSettings::default(),
            cache: CacheSettings::default(),
            aggregation: AggregationSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.cache.ttl_secs = ttl_secs;
        self
    }

    pub fn with_aggregation_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.aggregation.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.aggregation.max_workers = max_workers;
        self
    }
}

/// HTTP fetch timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_fetch_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_fetch_timeout(),
            read_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl FetchSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Cache TTL and refresh retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Snapshot lifetime in seconds; zero or negative never expires
    #[serde(default)]
    pub ttl_secs: i64,

    /// Refresh attempts per logical call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` is followed by a sleep of `n` units
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 0,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl CacheSettings {
    /// Snapshot lifetime, or `None` when snapshots never auto-expire
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs as u64))
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Attempt count, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Parallel aggregation limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSettings {
    /// Overall deadline for one aggregation in seconds
    #[serde(default = "default_aggregation_timeout")]
    pub timeout_secs: u64,

    /// Optional cap on concurrent loader calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_aggregation_timeout(),
            max_workers: None,
        }
    }
}

impl AggregationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    "http://localhost:8080/saml/config".to_string()
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_aggregation_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.fetch.connect_timeout(), Duration::from_secs(5));
        assert_eq!(settings.fetch.read_timeout(), Duration::from_secs(5));
        assert_eq!(settings.cache.ttl(), None);
        assert_eq!(settings.cache.attempts(), 3);
        assert_eq!(settings.cache.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(settings.aggregation.timeout(), Duration::from_secs(30));
        assert!(settings.aggregation.max_workers.is_none());
    }

    #[test]
    fn test_non_positive_ttl_never_expires() {
        let settings = Settings::default().with_ttl_secs(-5);
        assert_eq!(settings.cache.ttl(), None);

        let settings = settings.with_ttl_secs(60);
        assert_eq!(settings.cache.ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint: https://config.internal/saml\ncache:\n  ttl_secs: 300\naggregation:\n  max_workers: 4"
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.endpoint, "https://config.internal/saml");
        assert_eq!(settings.cache.ttl_secs, 300);
        assert_eq!(settings.cache.max_attempts, 3);
        assert_eq!(settings.aggregation.max_workers, Some(4));
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }
}
