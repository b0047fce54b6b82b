//! SAML Config Core
//!
//! Provider credential configuration for a SAML assertion issuance service:
//! a TTL cache over remotely served provider configuration, and parallel
//! aggregation of keystore/certificate metadata across every provider.
//!
//! # Architecture
//!
//! - `fetcher` - single HTTP GET of the flat key/value configuration
//! - `registry` - parsing into an immutable [`ConfigData`] snapshot
//! - `cache` - TTL cache with double-checked refresh and linear-backoff retry
//! - `keystore` - credential loading, sealed keystore format, signer hand-off
//! - `aggregator` - bounded fan-out of keystore loading with an overall deadline
//! - `service` - façade tying the above together
//!
//! # Example
//!
//! ```rust,no_run
//! use saml_config_core::{CredentialService, Settings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default().with_endpoint("https://config.internal/saml");
//! let service = CredentialService::from_settings(&settings, None)?;
//! service.init().await?;
//!
//! let result = service.get_all_credential_metadata().await?;
//! println!("{} of {} providers loaded", result.summary.success_count, result.summary.total_providers);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod keystore;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod settings;

pub use aggregator::{
    AggregationError, AggregationOutcome, AggregationResult, AggregationStatus,
    CredentialAggregator, CredentialMetadata, OperationSummary,
};
pub use cache::ConfigCacheManager;
pub use error::{ConfigurationError, FetchError, ParseError, RefreshError};
pub use fetcher::{ConfigFetcher, HttpConfigFetcher};
pub use keystore::{
    AssertionSigner, CertificateDetails, Credential, CredentialLoadError, CredentialLoader,
    KeystoreDetails, LoadedKeystore, SealedKeystoreBuilder, SealedKeystoreLoader,
};
pub use metrics::{MetricsRegistry, ServiceMetrics};
pub use registry::{ConfigData, GeneralConfig, ProviderConfig};
pub use service::{CredentialService, ServiceError};
pub use settings::{AggregationSettings, CacheSettings, FetchSettings, Settings};
