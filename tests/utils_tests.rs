//! Tests for utils module functionality against live responses.

use comfy_fetch::utils::{content_length, content_range, parse_content_range, total_size};
use reqwest::StatusCode;

mod common;
use common::helpers::*;
use common::server::{FileRoute, TestServer};

#[test]
fn test_parse_content_range_edge_cases() {
    let spaced = parse_content_range("bytes 0-1023/ 2048 ").unwrap();
    assert_eq!(spaced.total, Some(2048));

    let large = parse_content_range("bytes 0-1023/999999999999").unwrap();
    assert_eq!(large.total, Some(999999999999));

    let unknown = parse_content_range("bytes */*").unwrap();
    assert_eq!(unknown.start, None);
    assert_eq!(unknown.total, None);

    assert!(parse_content_range("bytes 0-1023").is_none());
    assert!(parse_content_range("items 0-1/2").is_none());
}

#[tokio::test]
async fn test_sizes_of_full_response() {
    let server = TestServer::start().await;
    server.file("/model.bin", FileRoute::new(create_test_content(2048)));

    let response = reqwest::get(server.url("/model.bin")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_length(response.headers()), Some(2048));
    assert_eq!(content_range(response.headers()), None);
    assert_eq!(total_size(response.status(), response.headers(), 0), Some(2048));
}

#[tokio::test]
async fn test_sizes_of_partial_response() {
    let server = TestServer::start().await;
    server.file("/model.bin", FileRoute::new(create_test_content(1000)));

    let response = reqwest::Client::new()
        .get(server.url("/model.bin"))
        .header(reqwest::header::RANGE, "bytes=400-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(content_length(response.headers()), Some(600));

    let range = content_range(response.headers()).unwrap();
    assert_eq!(range.start, Some(400));
    assert_eq!(range.end, Some(999));
    assert_eq!(total_size(response.status(), response.headers(), 400), Some(1000));
}

#[tokio::test]
async fn test_unsatisfiable_range_reports_total() {
    let server = TestServer::start().await;
    server.file("/model.bin", FileRoute::new(create_test_content(1000)));

    let response = reqwest::Client::new()
        .get(server.url("/model.bin"))
        .header(reqwest::header::RANGE, "bytes=1000-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    let range = content_range(response.headers()).unwrap();
    assert_eq!(range.start, None);
    assert_eq!(range.total, Some(1000));
}
