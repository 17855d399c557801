//! Integration tests for the probe server.
//!
//! These bind real sockets on loopback and talk to them with `reqwest`.
//! The test against an externally started instance is ignored by default:
//! Run with: cargo test --test integration -- --ignored

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use pretty_assertions::assert_eq;
use probe_server::api::AppState;
use probe_server::{Probe, RunningServer, Server, ServerError};
use reqwest::StatusCode;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the app on an ephemeral loopback port.
async fn spawn_app() -> RunningServer {
    Server::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .expect("Failed to bind ephemeral port")
        .spawn(AppState::new())
}

#[tokio::test]
async fn get_root_returns_200() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(app.url("/"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("Body should be JSON");
    assert_eq!(body["name"], "probe_server");

    app.shutdown(SHUTDOWN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn probe_accepts_root_and_rejects_unknown_path() {
    let app = spawn_app().await;
    let probe = Probe::new(&app.base_url(), Duration::from_secs(5)).unwrap();

    let status = probe.expect_status("/", StatusCode::OK).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    let err = probe
        .expect_status("/missing", StatusCode::OK)
        .await
        .unwrap_err();
    match err {
        ServerError::UnexpectedStatus {
            expected, actual, ..
        } => {
            assert_eq!(expected, StatusCode::OK);
            assert_eq!(actual, StatusCode::NOT_FOUND);
        }
        other => panic!("unexpected error: {other}"),
    }

    app.shutdown(SHUTDOWN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn health_and_ready_follow_lifecycle() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let health = client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let ready = client.get(app.url("/ready")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    assert_eq!(app.state().requests_served(), 2);

    app.shutdown(SHUTDOWN_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_port_and_refuses_requests() {
    let app = spawn_app().await;
    let addr = app.local_addr();
    let url = app.url("/");

    // Keep-alive connection in the pool must not hold up shutdown.
    let client = reqwest::Client::new();
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.shutdown(SHUTDOWN_TIMEOUT).await.unwrap();

    let after = reqwest::Client::new().get(&url).send().await;
    assert!(after.is_err(), "request after shutdown should fail");

    let rebound = Server::bind(addr).await;
    assert!(rebound.is_ok(), "port should be free: {:?}", rebound.err());
}

#[tokio::test]
async fn dropping_handle_releases_port() {
    let app = spawn_app().await;
    let addr = app.local_addr();
    drop(app);

    // Cancellation is delivered on the next runtime tick.
    let mut rebound = None;
    for _ in 0..50 {
        match Server::bind(addr).await {
            Ok(server) => {
                rebound = Some(server);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }

    assert!(rebound.is_some(), "port {} was not released after drop", addr.port());
}

#[tokio::test]
async fn port_is_released_when_test_body_panics() {
    let app = spawn_app().await;
    let addr = app.local_addr();

    let outcome = tokio::spawn(async move {
        let _app = app;
        panic!("assertion failed inside test body");
    })
    .await;
    assert!(outcome.is_err());

    let mut released = false;
    for _ in 0..50 {
        if Server::bind(addr).await.is_ok() {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(released, "port {} was not released after panic", addr.port());
}

#[tokio::test]
async fn concurrent_requests_are_all_served() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let requests = (0..8).map(|_| client.get(app.url("/")).send());
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    assert_eq!(app.state().requests_served(), 8);

    app.shutdown(SHUTDOWN_TIMEOUT).await.unwrap();
}

/// Probe an instance started separately, e.g. `probe-server serve`.
#[tokio::test]
#[ignore = "requires an instance listening on localhost:8080"]
async fn running_instance_on_8080_returns_200() {
    dotenvy::dotenv().ok();
    let base = std::env::var("PROBE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let probe = Probe::new(&base, Duration::from_secs(5)).unwrap();
    let status = probe.expect_status("/", StatusCode::OK).await;

    assert!(status.is_ok(), "GET / failed: {:?}", status.err());
}
