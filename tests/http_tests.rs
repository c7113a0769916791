//! Tests for HTTP client construction.

use comfy_fetch::http::{create_http_client, HttpClientConfig, DEFAULT_USER_AGENT};
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;

mod common;
use common::helpers::*;
use common::server::{FileRoute, Route, TestServer};

#[test]
fn test_config_with_custom_headers() {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("custom-test-agent"));
    let config = HttpClientConfig {
        connect_timeout: Duration::from_secs(5),
        headers: Some(headers),
        ..HttpClientConfig::default()
    };

    assert_eq!(
        config.headers.as_ref().unwrap().get(USER_AGENT),
        Some(&HeaderValue::from_static("custom-test-agent"))
    );
    assert!(create_http_client(config).is_ok());
    assert!(DEFAULT_USER_AGENT.starts_with("comfy-fetch/"));
}

#[tokio::test]
async fn test_client_does_not_follow_redirects() {
    let server = TestServer::start().await;
    server.route("/moved", Route::Redirect("/model.bin".into()));
    server.file("/model.bin", FileRoute::new(create_test_content(10)));

    let client = create_http_client(HttpClientConfig::default()).unwrap();
    let response = client.get(server.url("/moved")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/model.bin");
    assert_eq!(server.hits("/model.bin"), 0);
}

#[tokio::test]
async fn test_transport_retries_are_opt_in() {
    let server = TestServer::start().await;
    server.route("/busy", Route::Status(StatusCode::SERVICE_UNAVAILABLE));

    let plain = create_http_client(HttpClientConfig::default()).unwrap();
    let response = plain.get(server.url("/busy")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(server.hits("/busy"), 1);

    let retrying = create_http_client(HttpClientConfig {
        request_retries: 1,
        ..HttpClientConfig::default()
    })
    .unwrap();
    let response = retrying.get(server.url("/busy")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(server.hits("/busy"), 3);
}
