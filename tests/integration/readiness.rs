//! Readiness checks against live TCP and HTTP servers.

use kdemo::{CommandLine, ReadinessCheck, ReadinessError};
use reqwest::Method;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use crate::common::{listener, spawn_http_server, unused_port};

#[tokio::test]
async fn test_port_check_passes_against_listener() {
    let (_listener, port) = listener().await;

    let check = ReadinessCheck::port(port).timeout(Duration::from_secs(2));

    assert!(check.wait().await.is_ok());
}

#[tokio::test]
async fn test_port_check_waits_for_late_listener() {
    let port = unused_port().await;
    let check = ReadinessCheck::port(port)
        .timeout(Duration::from_secs(5))
        .interval(Duration::from_millis(20));

    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(listener);
    });

    let started = Instant::now();
    check.wait().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));

    server.abort();
}

#[tokio::test]
async fn test_port_check_times_out_within_margin() {
    let port = unused_port().await;
    let check = ReadinessCheck::port(port)
        .timeout(Duration::from_millis(500))
        .interval(Duration::from_millis(50));

    let started = Instant::now();
    let err = check.wait().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ReadinessError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(2000));
    assert!(err.to_string().contains(&port.to_string()));
}

#[tokio::test]
async fn test_http_check_passes_on_success_status() {
    let (port, server) = spawn_http_server().await;

    let check = ReadinessCheck::http(port, Method::GET).timeout(Duration::from_secs(5));
    assert!(check.wait().await.is_ok());

    server.abort();
}

#[tokio::test]
async fn test_http_check_treats_server_error_as_not_ready() {
    let (port, server) = spawn_http_server().await;

    let check = ReadinessCheck::http(port, Method::GET)
        .path("broken")
        .timeout(Duration::from_millis(600))
        .interval(Duration::from_millis(50));

    let err = check.wait().await.unwrap_err();
    match err {
        ReadinessError::Timeout { target, .. } => {
            assert_eq!(target, format!("GET http://127.0.0.1:{}/broken", port));
        }
        other => panic!("Expected timeout, got {:?}", other),
    }

    server.abort();
}

#[tokio::test]
async fn test_http_check_times_out_when_nothing_listens() {
    let port = unused_port().await;
    let check = ReadinessCheck::http(port, Method::HEAD)
        .timeout(Duration::from_millis(400))
        .interval(Duration::from_millis(50));

    let started = Instant::now();
    assert!(check.wait().await.is_err());
    assert!(started.elapsed() < Duration::from_millis(1900));
}

#[tokio::test]
async fn test_command_check_polls_until_marker_exists() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ready");
    let check = ReadinessCheck::command(CommandLine::shell("test -f ready"))
        .cwd(dir.path())
        .timeout(Duration::from_secs(5))
        .interval(Duration::from_millis(20));

    let writer = {
        let marker = marker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(marker, "ok").unwrap();
        })
    };

    check.wait().await.unwrap();
    assert!(marker.exists());
    writer.await.unwrap();
}
