//! Prometheus metrics for configuration refreshes and credential aggregation
//!
//! - `saml_config_refresh_attempts_total` (counter) - refresh attempts by result
//! - `saml_config_refresh_duration_seconds` (histogram) - successful refresh duration
//! - `saml_config_aggregations_total` (counter) - aggregations by status
//! - `saml_config_aggregation_duration_seconds` (histogram) - aggregation duration
//! - `saml_config_provider_results_total` (counter) - per-provider outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use saml_config_core::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().unwrap();
//! registry.metrics().record_refresh_attempt("success");
//! println!("{}", registry.encode_text().unwrap());
//! ```

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;
use thiserror::Error;

const NAMESPACE: &str = "saml_config";

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Refresh and aggregation metrics
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    refresh_attempts_total: CounterVec,
    refresh_duration_seconds: HistogramVec,
    aggregations_total: CounterVec,
    aggregation_duration_seconds: HistogramVec,
    provider_results_total: CounterVec,
}

impl ServiceMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let refresh_attempts_total = CounterVec::new(
            Opts::new(
                "refresh_attempts_total",
                "Configuration refresh attempts by result",
            )
            .namespace(NAMESPACE),
            &["result"],
        )?;

        let refresh_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "refresh_duration_seconds",
                "Duration of successful configuration refreshes, retries included",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["attempts"],
        )?;

        let aggregations_total = CounterVec::new(
            Opts::new("aggregations_total", "Credential aggregations by status")
                .namespace(NAMESPACE),
            &["status"],
        )?;

        let aggregation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "aggregation_duration_seconds",
                "Credential aggregation duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
            &["status"],
        )?;

        let provider_results_total = CounterVec::new(
            Opts::new(
                "provider_results_total",
                "Per-provider credential metadata outcomes",
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        registry.register(Box::new(refresh_attempts_total.clone()))?;
        registry.register(Box::new(refresh_duration_seconds.clone()))?;
        registry.register(Box::new(aggregations_total.clone()))?;
        registry.register(Box::new(aggregation_duration_seconds.clone()))?;
        registry.register(Box::new(provider_results_total.clone()))?;

        Ok(Self {
            refresh_attempts_total,
            refresh_duration_seconds,
            aggregations_total,
            aggregation_duration_seconds,
            provider_results_total,
        })
    }

    /// Record one refresh attempt; `result` is `success` or an error kind
    pub fn record_refresh_attempt(&self, result: &str) {
        self.refresh_attempts_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn observe_refresh(&self, attempts: u32, duration_secs: f64) {
        self.refresh_duration_seconds
            .with_label_values(&[&attempts.to_string()])
            .observe(duration_secs);
    }

    /// Record a finished aggregation and its per-provider tallies
    pub fn record_aggregation(
        &self,
        status: &str,
        duration_secs: f64,
        successes: usize,
        failures: usize,
    ) {
        self.aggregations_total.with_label_values(&[status]).inc();
        self.aggregation_duration_seconds
            .with_label_values(&[status])
            .observe(duration_secs);
        self.provider_results_total
            .with_label_values(&["SUCCESS"])
            .inc_by(successes as f64);
        self.provider_results_total
            .with_label_values(&["FAILURE"])
            .inc_by(failures as f64);
    }
}

/// Owns the Prometheus registry the service metrics live in
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    metrics: Arc<ServiceMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register the service metrics with an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let metrics = Arc::new(ServiceMetrics::new(&registry)?);
        Ok(Self { registry, metrics })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Encode every registered metric in the text exposition format
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
