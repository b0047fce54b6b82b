//! Credential Aggregator
//!
//! Loads credential metadata for every provider in a registry snapshot in
//! parallel and collects each outcome independently.
//!
//! # Architecture
//!
//! One task per provider is spawned into a single [`JoinSet`]. A semaphore
//! bounds how many loader calls run at once, and each loader call runs on
//! the blocking pool. The aggregation call owns the result map and fills it
//! from the join set until every task has reported or the overall deadline
//! expires. On expiry the remaining tasks are aborted; loader calls already
//! running on blocking threads are abandoned and their results dropped.

mod result;

pub use result::{
    AggregationOutcome, AggregationResult, AggregationStatus, CredentialMetadata,
    OperationSummary,
};

use crate::keystore::CredentialLoader;
use crate::metrics::ServiceMetrics;
use crate::registry::{ConfigData, GeneralConfig, ProviderConfig};
use crate::settings::AggregationSettings;
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Catastrophic aggregation failures
///
/// Per-provider failures never surface here; they become
/// [`CredentialMetadata::Failure`] entries.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Worker pool cannot be sized: {0}")]
    WorkerPool(String),
}

/// Fans credential loading out across every configured provider
#[derive(Debug)]
pub struct CredentialAggregator {
    loader: Arc<dyn CredentialLoader>,
    settings: AggregationSettings,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl CredentialAggregator {
    pub fn new(loader: Arc<dyn CredentialLoader>, settings: AggregationSettings) -> Self {
        Self {
            loader,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    /// Collect credential metadata for every provider in `registry`
    ///
    /// Provider failures and the deadline expiring are reported in the
    /// result; only an unusable worker pool configuration is an error.
    pub async fn aggregate(
        &self,
        registry: &ConfigData,
        overall_timeout: Duration,
    ) -> Result<AggregationResult, AggregationError> {
        let started = Instant::now();
        let deadline = started + overall_timeout;
        let operation_id = Uuid::new_v4();
        let total = registry.provider_count();

        let workers = self.pool_size(total)?;
        info!(
            %operation_id,
            providers = total,
            workers,
            timeout_ms = overall_timeout.as_millis() as u64,
            "Starting credential metadata aggregation"
        );

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut set = JoinSet::new();
        let mut remaining = BTreeSet::new();

        for (provider_id, config) in &registry.providers {
            remaining.insert(provider_id.clone());
            set.spawn(process_provider(
                provider_id.clone(),
                config.clone(),
                registry.general.clone(),
                Arc::clone(&self.loader),
                Arc::clone(&semaphore),
            ));
        }

        let mut providers = BTreeMap::new();
        let mut timed_out = false;

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(metadata))) => {
                    remaining.remove(metadata.provider_id());
                    providers.insert(metadata.provider_id().to_string(), metadata);
                }
                Ok(Some(Err(e))) => {
                    error!(%operation_id, error = %e, "Aggregation task ended abnormally");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    set.abort_all();
                    error!(
                        %operation_id,
                        timeout_ms = overall_timeout.as_millis() as u64,
                        pending = remaining.len(),
                        "Credential metadata aggregation timed out"
                    );
                    break;
                }
            }
        }

        let pending: Vec<String> = if timed_out {
            remaining.into_iter().collect()
        } else {
            // A task that ended without reporting still counts as a failure
            for provider_id in remaining {
                let metadata = CredentialMetadata::failure(
                    provider_id.as_str(),
                    failure_message("TaskFailed", "worker task ended without a result"),
                );
                providers.insert(provider_id, metadata);
            }
            Vec::new()
        };

        let duration = started.elapsed();
        let result = AggregationResult::new(operation_id, total, providers, pending, timed_out)
            .with_duration(duration.as_millis() as u64);

        if let Some(metrics) = &self.metrics {
            metrics.record_aggregation(
                result.status.as_str(),
                duration.as_secs_f64(),
                result.summary.success_count,
                result.summary.failure_count,
            );
        }

        info!(
            %operation_id,
            status = result.status.as_str(),
            succeeded = result.summary.success_count,
            failed = result.summary.failure_count,
            duration_ms = result.duration_ms,
            "Credential metadata aggregation finished"
        );

        Ok(result)
    }

    /// `min(providers, available parallelism)`, further capped by `max_workers`
    fn pool_size(&self, providers: usize) -> Result<usize, AggregationError> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut size = providers.min(cpus);

        if let Some(max) = self.settings.max_workers {
            if max == 0 {
                return Err(AggregationError::WorkerPool(
                    "max_workers must be at least 1".into(),
                ));
            }
            size = size.min(max);
        }

        Ok(size)
    }
}

fn failure_message(category: &str, message: impl std::fmt::Display) -> String {
    format!("Failed to process keystore: {} - {}", category, message)
}

async fn process_provider(
    provider_id: String,
    config: ProviderConfig,
    general: GeneralConfig,
    loader: Arc<dyn CredentialLoader>,
    semaphore: Arc<Semaphore>,
) -> CredentialMetadata {
    let missing = config.missing_fields();
    if !missing.is_empty() {
        let reason = format!("missing {}", missing.join(", "));
        warn!(provider = %provider_id, %reason, "Provider configuration is incomplete");
        return CredentialMetadata::failure(
            provider_id,
            failure_message("InvalidProviderConfig", reason),
        );
    }

    let (Some(keystore_file), Some(password), Some(alias)) = (
        config.keystore_file.clone(),
        config.keystore_password.clone(),
        config.key_alias.clone(),
    ) else {
        return CredentialMetadata::failure(
            provider_id,
            failure_message("InvalidProviderConfig", "incomplete provider configuration"),
        );
    };

    let path = match general.keystore_path(&keystore_file) {
        Ok(path) => path,
        Err(reason) => {
            warn!(provider = %provider_id, %reason, "Provider keystore path rejected");
            return CredentialMetadata::failure(
                provider_id,
                failure_message("InvalidProviderConfig", reason),
            );
        }
    };

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            return CredentialMetadata::failure(provider_id, failure_message("WorkerPool", e));
        }
    };

    let loaded = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        loader.load(&path, password.expose_secret(), &alias)
    })
    .await;

    match loaded {
        Ok(Ok(store)) => {
            info!(provider = %provider_id, entries = store.entries.len(), "Processed keystore");
            CredentialMetadata::success(provider_id, config.parse_encoding, store.metadata())
        }
        Ok(Err(e)) => {
            error!(provider = %provider_id, category = e.category(), error = %e, "Failed to process keystore");
            CredentialMetadata::failure(provider_id, failure_message(e.category(), e))
        }
        Err(e) if e.is_panic() => {
            error!(provider = %provider_id, "Keystore loader panicked");
            CredentialMetadata::failure(provider_id, failure_message("Panic", "keystore loader panicked"))
        }
        Err(e) => CredentialMetadata::failure(provider_id, failure_message("TaskFailed", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{CredentialLoadError, LoadedKeystore};
    use std::path::Path;

    #[derive(Debug)]
    struct PanickingLoader;

    impl CredentialLoader for PanickingLoader {
        fn store_type(&self) -> &str {
            "TEST"
        }

        fn load(&self, _: &Path, _: &str, _: &str) -> Result<LoadedKeystore, CredentialLoadError> {
            panic!("loader exploded");
        }
    }

    fn registry(providers: Vec<(&str, ProviderConfig)>) -> ConfigData {
        ConfigData::new(
            GeneralConfig::new("/nonexistent"),
            providers
                .into_iter()
                .map(|(id, c)| (id.to_string(), c))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_zero_worker_cap_is_rejected() {
        let aggregator = CredentialAggregator::new(
            Arc::new(PanickingLoader),
            AggregationSettings {
                timeout_secs: 1,
                max_workers: Some(0),
            },
        );

        let err = aggregator
            .aggregate(&registry(vec![]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::WorkerPool(_)));
    }

    #[tokio::test]
    async fn test_empty_registry_completes_immediately() {
        let aggregator =
            CredentialAggregator::new(Arc::new(PanickingLoader), AggregationSettings::default());

        let result = aggregator
            .aggregate(&registry(vec![]), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.providers.is_empty());
        assert_eq!(result.status, AggregationStatus::Completed);
        assert_eq!(result.summary.total_providers, 0);
    }

    #[tokio::test]
    async fn test_incomplete_provider_is_a_failure_entry() {
        let aggregator =
            CredentialAggregator::new(Arc::new(PanickingLoader), AggregationSettings::default());
        let incomplete = ProviderConfig {
            keystore_file: Some("a.keystore".into()),
            ..Default::default()
        };

        let result = aggregator
            .aggregate(&registry(vec![("A", incomplete)]), Duration::from_secs(1))
            .await
            .unwrap();

        match &result.providers["A"] {
            CredentialMetadata::Failure { error, .. } => {
                assert!(error.starts_with("Failed to process keystore: InvalidProviderConfig"));
                assert!(error.contains("keystore password"));
                assert!(error.contains("key alias"));
            }
            other => panic!("unexpected metadata: {:?}", other),
        }
        assert_eq!(result.status, AggregationStatus::CompletedWithFailures);
    }

    #[tokio::test]
    async fn test_loader_panic_is_isolated() {
        let aggregator =
            CredentialAggregator::new(Arc::new(PanickingLoader), AggregationSettings::default());
        let config = ProviderConfig::new("a1", "a.keystore", "pw", "UTF-8");

        let result = aggregator
            .aggregate(
                &registry(vec![("A", config.clone()), ("B", config)]),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(result.providers.len(), 2);
        assert_eq!(result.summary.failure_count, 2);
        for metadata in result.providers.values() {
            match metadata {
                CredentialMetadata::Failure { error, .. } => assert!(error.contains("Panic")),
                other => panic!("unexpected metadata: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_keystore_outside_library_is_rejected() {
        let aggregator =
            CredentialAggregator::new(Arc::new(PanickingLoader), AggregationSettings::default());

        let result = aggregator
            .aggregate(
                &registry(vec![
                    ("ABS", ProviderConfig::new("a1", "/etc/shadow", "pw", "UTF-8")),
                    ("UP", ProviderConfig::new("a1", "../../shadow", "pw", "UTF-8")),
                ]),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(result.summary.failure_count, 2);
        for metadata in result.providers.values() {
            match metadata {
                CredentialMetadata::Failure { error, .. } => {
                    assert!(error.starts_with("Failed to process keystore: InvalidProviderConfig"));
                    assert!(!error.contains("Panic"));
                }
                other => panic!("unexpected metadata: {:?}", other),
            }
        }
    }
}
