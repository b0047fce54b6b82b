//! Configuration Cache Manager
//!
//! Owns the authoritative [`ConfigData`] snapshot and refreshes it from a
//! [`ConfigFetcher`] when it expires or is explicitly cleared.
//!
//! # Architecture
//!
//! ```text
//! get_config_data()
//!     ├── snapshot fresh? ──────────────► return Arc<ConfigData>   (lock-free)
//!     └── acquire refresh lock
//!             ├── re-check freshness ───► return installed snapshot
//!             └── fetch → parse → validate (retried, linear backoff)
//!                     └── install new snapshot atomically
//! ```
//!
//! Readers load the snapshot through an [`ArcSwapOption`] and never block;
//! only callers that find the snapshot stale contend on the refresh lock, and
//! at most one of them talks to the endpoint.

use crate::error::{ConfigurationError, RefreshError};
use crate::fetcher::ConfigFetcher;
use crate::metrics::ServiceMetrics;
use crate::registry::{self, ConfigData};
use crate::settings::CacheSettings;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// An installed snapshot and the moment it was installed
#[derive(Debug)]
struct Snapshot {
    data: Arc<ConfigData>,
    refreshed_at: Instant,
    refreshed_at_utc: DateTime<Utc>,
}

/// TTL cache over the remote provider configuration
#[derive(Debug)]
pub struct ConfigCacheManager {
    fetcher: Arc<dyn ConfigFetcher>,
    settings: CacheSettings,
    snapshot: ArcSwapOption<Snapshot>,
    refresh_lock: Mutex<()>,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl ConfigCacheManager {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>, settings: CacheSettings) -> Self {
        Self {
            fetcher,
            settings,
            snapshot: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            metrics: None,
        }
    }

    /// Attach metrics recorded on every refresh attempt
    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Load the first snapshot eagerly, failing fast if it cannot be obtained
    pub async fn init(&self) -> Result<Arc<ConfigData>, ConfigurationError> {
        let data = self.get_config_data().await?;
        info!(
            providers = data.provider_count(),
            ttl_secs = self.settings.ttl_secs,
            "Configuration cache initialized"
        );
        Ok(data)
    }

    /// Return the current snapshot, refreshing it first if it is stale
    ///
    /// Fails only after every retry attempt has failed; in that case the
    /// previous snapshot (if any) is left untouched.
    pub async fn get_config_data(&self) -> Result<Arc<ConfigData>, ConfigurationError> {
        if let Some(data) = self.fresh_snapshot() {
            return Ok(data);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(data) = self.fresh_snapshot() {
            debug!("Using snapshot installed by a concurrent refresh");
            return Ok(data);
        }

        self.refresh().await
    }

    /// Drop the current snapshot so the next read refreshes regardless of TTL
    pub fn clear_cache(&self) {
        self.snapshot.store(None);
        info!("Configuration cache cleared");
    }

    /// Wall-clock time the current snapshot was installed
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load().as_ref().map(|s| s.refreshed_at_utc)
    }

    /// Time elapsed since the current snapshot was installed
    pub fn snapshot_age(&self) -> Option<Duration> {
        self.snapshot
            .load()
            .as_ref()
            .map(|s| s.refreshed_at.elapsed())
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    fn fresh_snapshot(&self) -> Option<Arc<ConfigData>> {
        let snapshot = self.snapshot.load_full()?;
        match self.settings.ttl() {
            Some(ttl) if snapshot.refreshed_at.elapsed() > ttl => None,
            _ => Some(Arc::clone(&snapshot.data)),
        }
    }

    async fn refresh(&self) -> Result<Arc<ConfigData>, ConfigurationError> {
        let started = Instant::now();
        let max_attempts = self.settings.attempts();
        let mut attempt = 1;

        loop {
            match self.try_refresh().await {
                Ok(data) => {
                    let data = Arc::new(data);
                    self.snapshot.store(Some(Arc::new(Snapshot {
                        data: Arc::clone(&data),
                        refreshed_at: Instant::now(),
                        refreshed_at_utc: Utc::now(),
                    })));

                    if let Some(metrics) = &self.metrics {
                        metrics.record_refresh_attempt("success");
                        metrics.observe_refresh(attempt, started.elapsed().as_secs_f64());
                    }
                    info!(
                        attempt,
                        providers = data.provider_count(),
                        "Configuration snapshot refreshed"
                    );
                    return Ok(data);
                }
                Err(err) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_refresh_attempt(err.kind());
                    }

                    if attempt >= max_attempts {
                        error!(
                            attempts = attempt,
                            error = %err,
                            "Configuration refresh failed, retries exhausted"
                        );
                        return Err(ConfigurationError::new(attempt, err));
                    }

                    let delay = self.settings.retry_base_delay() * attempt;
                    warn!(
                        attempt,
                        max_attempts,
                        kind = err.kind(),
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Configuration refresh attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_refresh(&self) -> Result<ConfigData, RefreshError> {
        let raw = self.fetcher.fetch().await?;
        let data = registry::parse(&raw)?;
        data.validate().map_err(RefreshError::Invalid)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StaticFetcher {
        body: HashMap<String, String>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ConfigFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<HashMap<String, String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn fetcher(pairs: &[(&str, &str)]) -> Arc<StaticFetcher> {
        Arc::new(StaticFetcher {
            body: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            ttl_secs: 0,
            max_attempts: 2,
            retry_base_delay_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_shared_between_reads() {
        let fetcher = fetcher(&[("CERT_LIB_PATH", "certs"), ("PROVIDER_LIST", "A")]);
        let cache = ConfigCacheManager::new(fetcher.clone(), settings());

        assert!(cache.last_refreshed().is_none());
        let first = cache.init().await.unwrap();
        let second = cache.get_config_data().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(cache.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn test_validation_gate_rejects_empty_provider_list() {
        let fetcher = fetcher(&[("CERT_LIB_PATH", "certs")]);
        let cache = ConfigCacheManager::new(fetcher.clone(), settings());

        let err = cache.get_config_data().await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_error, RefreshError::Invalid(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(cache.last_refreshed().is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_retried() {
        let fetcher = fetcher(&[("PROVIDER_LIST", "A")]);
        let cache = ConfigCacheManager::new(fetcher.clone(), settings());

        let err = cache.get_config_data().await.unwrap_err();
        assert_eq!(err.last_error.kind(), "parse");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
