//! HTTP fetcher against a mock configuration endpoint

use saml_config_core::{ConfigFetcher, FetchError, FetchSettings, HttpConfigFetcher};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server_with(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/saml/config"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn fetcher(server: &MockServer, settings: &FetchSettings) -> HttpConfigFetcher {
    HttpConfigFetcher::new(format!("{}/saml/config", server.uri()), settings).unwrap()
}

#[tokio::test]
async fn test_fetch_flat_object() {
    let server = server_with(ResponseTemplate::new(200).set_body_json(json!({
        "CERT_LIB_PATH": "certs",
        "PROVIDER_LIST": "A,B",
        "A_KEYALIAS": "a1",
        "RETRIES": 3,
        "UNUSED": null
    })))
    .await;

    let map = fetcher(&server, &FetchSettings::default()).fetch().await.unwrap();

    assert_eq!(map["CERT_LIB_PATH"], "certs");
    assert_eq!(map["PROVIDER_LIST"], "A,B");
    assert_eq!(map["RETRIES"], "3");
    assert!(!map.contains_key("UNUSED"));
}

#[tokio::test]
async fn test_non_success_status_is_reported() {
    let server = server_with(ResponseTemplate::new(503)).await;

    let err = fetcher(&server, &FetchSettings::default())
        .fetch()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_empty_body_is_a_failure() {
    let server = server_with(ResponseTemplate::new(200)).await;

    let err = fetcher(&server, &FetchSettings::default())
        .fetch()
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::EmptyBody { .. }));
}

#[tokio::test]
async fn test_nested_values_are_rejected() {
    let server = server_with(ResponseTemplate::new(200).set_body_json(json!({
        "CERT_LIB_PATH": "certs",
        "PROVIDER_LIST": { "A": true }
    })))
    .await;

    let err = fetcher(&server, &FetchSettings::default())
        .fetch()
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::InvalidBody(_)));
}

#[tokio::test]
async fn test_slow_endpoint_hits_read_timeout() {
    let server = server_with(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "CERT_LIB_PATH": "certs" }))
            .set_delay(Duration::from_secs(5)),
    )
    .await;
    let settings = FetchSettings {
        connect_timeout_secs: 1,
        read_timeout_secs: 1,
    };

    let started = std::time::Instant::now();
    let err = fetcher(&server, &settings).fetch().await.unwrap_err();

    assert!(matches!(err, FetchError::Request { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let settings = FetchSettings {
        connect_timeout_secs: 1,
        read_timeout_secs: 1,
    };
    let fetcher = HttpConfigFetcher::new("http://127.0.0.1:9/saml/config", &settings).unwrap();

    let err = fetcher.fetch().await.unwrap_err();
    assert!(matches!(err, FetchError::Request { .. }));
    assert!(err.to_string().contains("127.0.0.1:9"));
}
