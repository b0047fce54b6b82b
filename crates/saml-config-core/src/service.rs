//! Credential Service
//!
//! Façade over the cache manager, the keystore loader and the aggregator.
//! This is the surface the REST layer and the CLI talk to.

use crate::aggregator::{AggregationError, AggregationResult, CredentialAggregator};
use crate::cache::ConfigCacheManager;
use crate::error::{ConfigurationError, FetchError};
use crate::fetcher::HttpConfigFetcher;
use crate::keystore::{
    AssertionSigner, Credential, CredentialLoadError, CredentialLoader, SealedKeystoreLoader,
    SignerError,
};
use crate::metrics::ServiceMetrics;
use crate::registry::ConfigData;
use crate::settings::{AggregationSettings, Settings};
use secrecy::ExposeSecret;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by [`CredentialService`]
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {provider_id} is misconfigured: {reason}")]
    InvalidProvider { provider_id: String, reason: String },

    #[error("Failed to load credential for provider {provider_id}: {source}")]
    CredentialLoad {
        provider_id: String,
        #[source]
        source: CredentialLoadError,
    },

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Short error name for response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Configuration(_) => "ConfigurationError",
            ServiceError::UnknownProvider(_) => "UnknownProvider",
            ServiceError::InvalidProvider { .. } => "InvalidProviderConfig",
            ServiceError::CredentialLoad { source, .. } => source.category(),
            ServiceError::Signer(_) => "SignerError",
            ServiceError::Aggregation(_) => "AggregationError",
            ServiceError::Task(_) => "TaskFailed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Provider configuration and credential operations
#[derive(Debug)]
pub struct CredentialService {
    cache: Arc<ConfigCacheManager>,
    loader: Arc<dyn CredentialLoader>,
    aggregator: CredentialAggregator,
}

impl CredentialService {
    pub fn new(
        cache: Arc<ConfigCacheManager>,
        loader: Arc<dyn CredentialLoader>,
        settings: AggregationSettings,
    ) -> Self {
        let aggregator = CredentialAggregator::new(Arc::clone(&loader), settings);
        Self {
            cache,
            loader,
            aggregator,
        }
    }

    /// Wire an HTTP fetcher and the sealed keystore loader from `settings`
    pub fn from_settings(
        settings: &Settings,
        metrics: Option<Arc<ServiceMetrics>>,
    ) -> std::result::Result<Self, FetchError> {
        let fetcher = Arc::new(HttpConfigFetcher::new(&settings.endpoint, &settings.fetch)?);
        let loader: Arc<dyn CredentialLoader> = Arc::new(SealedKeystoreLoader::new());

        let mut cache = ConfigCacheManager::new(fetcher, settings.cache.clone());
        let mut aggregator =
            CredentialAggregator::new(Arc::clone(&loader), settings.aggregation.clone());
        if let Some(metrics) = metrics {
            cache = cache.with_metrics(Arc::clone(&metrics));
            aggregator = aggregator.with_metrics(metrics);
        }

        info!(endpoint = %settings.endpoint, "Credential service configured");

        Ok(Self {
            cache: Arc::new(cache),
            loader,
            aggregator,
        })
    }

    /// Eagerly load the first configuration snapshot
    pub async fn init(&self) -> Result<Arc<ConfigData>> {
        Ok(self.cache.init().await?)
    }

    /// Current provider configuration
    pub async fn get_config(&self) -> Result<Arc<ConfigData>> {
        Ok(self.cache.get_config_data().await?)
    }

    /// Force the next configuration read to refresh
    pub fn clear_cache(&self) {
        self.cache.clear_cache();
    }

    /// Credential metadata for every configured provider
    pub async fn get_all_credential_metadata(&self) -> Result<AggregationResult> {
        let config = self.cache.get_config_data().await?;
        let timeout = self.aggregator.settings().timeout();
        Ok(self.aggregator.aggregate(&config, timeout).await?)
    }

    /// Load the signing credential of one provider
    pub async fn load_credential(&self, provider_id: &str) -> Result<Credential> {
        let config = self.cache.get_config_data().await?;
        let provider = config
            .provider(provider_id)
            .ok_or_else(|| ServiceError::UnknownProvider(provider_id.to_string()))?;

        let invalid = |reason: String| ServiceError::InvalidProvider {
            provider_id: provider_id.to_string(),
            reason,
        };
        let missing = provider.missing_fields();
        if !missing.is_empty() {
            return Err(invalid(format!("missing {}", missing.join(", "))));
        }
        let (Some(file), Some(password), Some(alias)) = (
            provider.keystore_file.clone(),
            provider.keystore_password.clone(),
            provider.key_alias.clone(),
        ) else {
            return Err(invalid("incomplete provider configuration".into()));
        };

        let path = config.general.keystore_path(&file).map_err(invalid)?;
        let loader = Arc::clone(&self.loader);
        debug!(provider = %provider_id, path = %path.display(), "Loading provider credential");

        let store = tokio::task::spawn_blocking(move || {
            loader.load(&path, password.expose_secret(), &alias)
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?
        .map_err(|source| ServiceError::CredentialLoad {
            provider_id: provider_id.to_string(),
            source,
        })?;

        Ok(store.credential)
    }

    /// Sign `document` with the provider's credential through `signer`
    pub async fn sign_for_provider(
        &self,
        provider_id: &str,
        document: &[u8],
        signer: &dyn AssertionSigner,
    ) -> Result<Vec<u8>> {
        let credential = self.load_credential(provider_id).await?;
        let signed = signer.sign(document, &credential)?;
        info!(provider = %provider_id, bytes = signed.len(), "Signed document for provider");
        Ok(signed)
    }

    pub fn cache(&self) -> &Arc<ConfigCacheManager> {
        &self.cache
    }
}
