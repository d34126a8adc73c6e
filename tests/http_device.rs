// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! End-to-end tests for the HTTP transport against a stub device.

mod common;

use common::StubDevice;
use serde_json::Value;
use tapper_bridge::transport::http::HttpTapperProtocol;
use tapper_bridge::transport::{duration_params, CommandResponse, TapperProtocol};
use tapper_bridge::{HttpConfig, TapperError, TapperStatus};

fn protocol_for(stub: &StubDevice) -> HttpTapperProtocol {
    HttpTapperProtocol::new("station1", &HttpConfig::new(stub.base_url())).unwrap()
}

#[tokio::test]
async fn test_status_is_fetched_and_parsed() {
    let stub = StubDevice::spawn("Position: middle, Operation: idle").await;
    let protocol = protocol_for(&stub);

    let status = protocol.get_status().await.unwrap();
    assert_eq!(status, TapperStatus::Middle);
    assert_eq!(stub.requests(), vec!["GET /status"]);
}

#[tokio::test]
async fn test_simple_command_uses_get() {
    let stub = StubDevice::spawn("idle").await;
    let protocol = protocol_for(&stub);

    let response = protocol.send_command("tap_card1", None).await.unwrap();
    assert_eq!(response, CommandResponse::Text("OK".to_string()));
    assert_eq!(stub.requests(), vec!["GET /tap_card1"]);
}

#[tokio::test]
async fn test_parameterized_command_posts_json() {
    let stub = StubDevice::spawn("idle").await;
    let protocol = protocol_for(&stub);

    let response = protocol
        .send_command("extend_for_time", Some(&duration_params(1400)))
        .await
        .unwrap();
    match response {
        CommandResponse::Json(body) => assert_eq!(body["result"], "ok"),
        other => panic!("expected JSON response, got {other:?}"),
    }

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /command "));
    let body: Value = serde_json::from_str(requests[0].trim_start_matches("POST /command "))
        .expect("request body should be JSON");
    assert_eq!(body["action"], "extend_for_time");
    assert_eq!(body["duration_ms"], 1400);
}

#[tokio::test]
async fn test_timed_motion_uses_dedicated_endpoint() {
    let stub = StubDevice::spawn("idle").await;
    let protocol = protocol_for(&stub);

    let response = protocol.extend_for_time(1385).await.unwrap();
    assert_eq!(response, CommandResponse::Text("OK".to_string()));

    let response = protocol.retract_for_time(1400).await.unwrap();
    assert_eq!(response, CommandResponse::Text("OK".to_string()));

    assert_eq!(
        stub.requests(),
        vec![
            "POST /extend_for_time?duration=1385",
            "POST /retract_for_time?duration=1400"
        ]
    );
}

#[tokio::test]
async fn test_http_error_status_is_protocol_error() {
    let stub = StubDevice::spawn("idle").await;
    let protocol = protocol_for(&stub);

    let err = protocol.send_command("boom", None).await.unwrap_err();
    match err {
        TapperError::Protocol { ref command, ref message, .. } => {
            assert_eq!(command, "boom");
            assert!(message.contains("500"));
        }
        other => panic!("expected Protocol error, got {other}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_refused_connection_is_connection_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = HttpConfig::new(format!("http://{addr}"));
    let protocol = HttpTapperProtocol::new("station1", &config).unwrap();

    let err = protocol.get_status().await.unwrap_err();
    match err {
        TapperError::Connection { ref message, ref details, .. } => {
            assert!(message.contains("status"));
            assert!(details.is_some());
        }
        ref other => panic!("expected Connection error, got {other}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let stub = StubDevice::spawn("idle").await;
    let mut config = HttpConfig::new(stub.base_url());
    config.timeout_ms = 200;
    let protocol = HttpTapperProtocol::new("station1", &config).unwrap();

    let err = protocol.send_command("slow", None).await.unwrap_err();
    match err {
        TapperError::Timeout { operation, timeout_ms, .. } => {
            assert_eq!(operation, "slow");
            assert_eq!(timeout_ms, 200);
        }
        other => panic!("expected Timeout error, got {other}"),
    }
}
