//! HTTP handlers for the credential configuration service

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use saml_config_core::{
    AggregationOutcome, ConfigData, CredentialService, MetricsRegistry, ServiceError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Application state
pub struct AppState {
    pub service: Arc<CredentialService>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    pub fn new(service: Arc<CredentialService>, metrics: MetricsRegistry) -> Self {
        Self { service, metrics }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/config/clear-cache", post(clear_cache))
        .route("/keystores", get(get_keystores))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response code for an aggregation outcome
pub fn status_for(outcome: AggregationOutcome) -> StatusCode {
    match outcome {
        AggregationOutcome::Success => StatusCode::OK,
        AggregationOutcome::PartialSuccess => StatusCode::PARTIAL_CONTENT,
        AggregationOutcome::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        AggregationOutcome::Failed => StatusCode::BAD_REQUEST,
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_last_refreshed: state.service.cache().last_refreshed(),
    })
}

async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<ConfigData>, ApiError> {
    let config = state.service.get_config().await?;
    Ok(Json(config.as_ref().clone()))
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.service.clear_cache();
    StatusCode::NO_CONTENT
}

async fn get_keystores(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let result = state.service.get_all_credential_metadata().await?;
    let status = status_for(result.outcome());

    if status != StatusCode::OK {
        tracing::warn!(
            operation_id = %result.summary.operation_id,
            status = result.status.as_str(),
            failed = result.summary.failure_count,
            "Keystore metadata retrieved with errors"
        );
    }

    Ok((status, Json(result)).into_response())
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = state.metrics.encode_text().map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorBody::new("MetricsError", e.to_string()),
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub config_last_refreshed: Option<DateTime<Utc>>,
}

/// Error body returned with every non-success response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub operation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            operation_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

/// API error
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidProvider { .. } | ServiceError::CredentialLoad { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Signer(_) | ServiceError::Aggregation(_) | ServiceError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody::new(err.kind(), err.to_string());
        tracing::error!(
            operation_id = %body.operation_id,
            error = %err,
            status = status.as_u16(),
            "Request failed"
        );

        Self { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
