//! Common test utilities shared across integration tests.

use axum::{Router, http::StatusCode, routing::get};
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Reserve an ephemeral port and release it so nothing listens there.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Bind a listener on an ephemeral loopback port.
pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Serve `/` with 200 and `/broken` with 500 on an ephemeral port.
pub async fn spawn_http_server() -> (u16, JoinHandle<()>) {
    let app = Router::new()
        .route("/", get(|| async { "console" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        );
    let (listener, port) = listener().await;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (port, handle)
}

/// Poll until `path` exists.
///
/// # Panics
///
/// Panics if the file does not appear within `timeout`.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> String {
    let start = tokio::time::Instant::now();
    loop {
        if let Ok(content) = std::fs::read_to_string(path) {
            if !content.is_empty() {
                return content;
            }
        }
        if start.elapsed() > timeout {
            panic!("Timeout waiting for {}", path.display());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
