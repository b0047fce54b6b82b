//! Configuration Fetcher
//!
//! Retrieves the raw key/value configuration map from a remote endpoint.
//! A fetch is a single HTTP GET with bounded connect and read timeouts;
//! retrying is the cache manager's job, so nothing here loops.

use crate::error::FetchError;
use crate::settings::FetchSettings;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Source of the raw provider configuration map
///
/// Implementations must be stateless per call and must not retry; the
/// cache manager owns the retry policy.
#[async_trait::async_trait]
pub trait ConfigFetcher: Send + Sync + fmt::Debug {
    /// Retrieve the current flat key/value configuration
    async fn fetch(&self) -> Result<HashMap<String, String>, FetchError>;
}

/// Fetches configuration with a single GET against a JSON endpoint
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpConfigFetcher {
    /// Create a fetcher for `endpoint` with the given timeouts
    pub fn new(endpoint: impl Into<String>, settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self) -> Result<HashMap<String, String>, FetchError> {
        debug!(endpoint = %self.endpoint, "Fetching provider configuration");

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Request {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;

        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody {
                endpoint: self.endpoint.clone(),
            });
        }

        let map = parse_body(&body)?;
        debug!(endpoint = %self.endpoint, keys = map.len(), "Fetched provider configuration");
        Ok(map)
    }
}

/// Decode a flat JSON object into a string map
///
/// Numbers and booleans are kept in their textual form and `null` values
/// are dropped. Nested arrays or objects make the whole body invalid.
pub fn parse_body(body: &str) -> Result<HashMap<String, String>, FetchError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidBody(format!("JSON error: {}", e)))?;

    let serde_json::Value::Object(object) = value else {
        return Err(FetchError::InvalidBody(
            "expected a JSON object of key/value pairs".into(),
        ));
    };

    let mut map = HashMap::with_capacity(object.len());
    for (key, value) in object {
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => continue,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(FetchError::InvalidBody(format!(
                    "value for key {} is not a scalar",
                    key
                )));
            }
        };
        map.insert(key, text);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_flat_object() {
        let map = parse_body(r#"{"CERT_LIB_PATH": "certs", "PROVIDER_LIST": "A"}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["CERT_LIB_PATH"], "certs");
    }

    #[test]
    fn test_parse_body_scalars_and_nulls() {
        let map = parse_body(r#"{"PORT": 8443, "ENABLED": true, "GONE": null}"#).unwrap();
        assert_eq!(map["PORT"], "8443");
        assert_eq!(map["ENABLED"], "true");
        assert!(!map.contains_key("GONE"));
    }

    #[test]
    fn test_parse_body_rejects_nested_values() {
        let err = parse_body(r#"{"PROVIDER_LIST": ["A", "B"]}"#).unwrap_err();
        assert!(matches!(err, FetchError::InvalidBody(_)));
        assert!(err.to_string().contains("PROVIDER_LIST"));
    }

    #[test]
    fn test_parse_body_rejects_non_objects() {
        assert!(matches!(parse_body("[]"), Err(FetchError::InvalidBody(_))));
        assert!(matches!(parse_body("not json"), Err(FetchError::InvalidBody(_))));
    }
}
