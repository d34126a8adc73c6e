// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Failover tests with real transports: a dead endpoint first in priority,
//! a live stub second.

mod common;

use common::StubDevice;
use tapper_bridge::transport::http::HttpTapperProtocol;
use tapper_bridge::{
    FallbackTapperProtocol, HttpConfig, TapperError, TapperProtocol, TapperStatus, TapperTransport,
};

async fn dead_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn http_member(base_url: &str) -> TapperTransport {
    TapperTransport::Http(
        HttpTapperProtocol::new("station1", &HttpConfig::new(base_url)).unwrap(),
    )
}

#[tokio::test]
async fn test_chain_falls_through_to_live_device() {
    let stub = StubDevice::spawn("middle").await;
    let chain = FallbackTapperProtocol::new(
        "station1",
        vec![http_member(&dead_endpoint().await), http_member(&stub.base_url())],
    )
    .unwrap();

    let status = chain.get_status().await.unwrap();
    assert_eq!(status, TapperStatus::Middle);
    assert_eq!(stub.requests(), vec!["GET /status"]);
}

#[tokio::test]
async fn test_cached_member_skips_dead_endpoint() {
    let stub = StubDevice::spawn("middle").await;
    let chain = FallbackTapperProtocol::new(
        "station1",
        vec![http_member(&dead_endpoint().await), http_member(&stub.base_url())],
    )
    .unwrap();

    chain.send_command("tap_card1", None).await.unwrap();
    chain.send_command("tap_card2", None).await.unwrap();
    chain.get_status().await.unwrap();

    // All three operations landed on the live device; only the first one
    // paid for probing the dead endpoint
    assert_eq!(
        stub.requests(),
        vec!["GET /tap_card1", "GET /tap_card2", "GET /status"]
    );
}

#[tokio::test]
async fn test_all_members_down_aggregates_errors() {
    let chain = FallbackTapperProtocol::new(
        "station1",
        vec![
            http_member(&dead_endpoint().await),
            http_member(&dead_endpoint().await),
        ],
    )
    .unwrap();

    let err = chain.send_command("tap_card1", None).await.unwrap_err();
    match err {
        TapperError::Protocol { protocol, command, message, .. } => {
            assert_eq!(protocol, "CachedFallback");
            assert_eq!(command, "tap_card1");
            assert!(message.contains("all protocols failed"));
        }
        other => panic!("expected Protocol error, got {other}"),
    }
}

#[tokio::test]
async fn test_timed_motion_through_chain() {
    let stub = StubDevice::spawn("middle").await;
    let chain = FallbackTapperProtocol::new(
        "station1",
        vec![http_member(&dead_endpoint().await), http_member(&stub.base_url())],
    )
    .unwrap();

    chain.extend_for_time(1000).await.unwrap();
    chain.retract_for_time(995).await.unwrap();

    assert_eq!(
        stub.requests(),
        vec![
            "POST /extend_for_time?duration=1000",
            "POST /retract_for_time?duration=995"
        ]
    );
}
