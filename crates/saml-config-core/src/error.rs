//! Error types for configuration retrieval
//!
//! Fetch and parse failures are retried inside the cache manager and only
//! surface to callers as a [`ConfigurationError`] once retries are exhausted.
//! Credential and aggregation errors live next to the code that raises them
//! (`keystore` and `aggregator`).

use thiserror::Error;

/// Failure to retrieve the raw configuration map from the remote endpoint
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Connection, timeout or transport failure
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    /// Endpoint answered with a non-2xx status
    #[error("Configuration endpoint {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    /// Endpoint answered 2xx with nothing in the body
    #[error("Configuration endpoint {endpoint} returned an empty body")]
    EmptyBody { endpoint: String },

    /// Body is not a flat JSON object of scalar values
    #[error("Invalid configuration body: {0}")]
    InvalidBody(String),
}

impl FetchError {
    /// Status code carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The raw configuration map could not be turned into a registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Key {0} must not be empty")]
    EmptyValue(String),
}

/// Failure of a single refresh attempt
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Parsed snapshot rejected by the validation gate
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl RefreshError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::Fetch(_) => "fetch",
            RefreshError::Parse(_) => "parse",
            RefreshError::Invalid(_) => "invalid",
        }
    }
}

/// Configuration could not be obtained after every retry attempt
#[derive(Error, Debug)]
#[error("Failed to retrieve configuration data after {attempts} attempt(s): {last_error}")]
pub struct ConfigurationError {
    /// Number of attempts made before giving up
    pub attempts: u32,

    /// The failure of the final attempt
    #[source]
    pub last_error: RefreshError,
}

impl ConfigurationError {
    pub fn new(attempts: u32, last_error: RefreshError) -> Self {
        Self {
            attempts,
            last_error,
        }
    }
}
