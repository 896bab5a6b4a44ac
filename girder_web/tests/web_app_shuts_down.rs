use axum::Router;
use axum::routing::get;
use girder_core::AppContext;
use girder_web::{WebApp, WebError, with_default_middlewares};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::test(flavor = "multi_thread")]
async fn web_app_serves_until_terminated_then_closes() {
    // Given
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let closed = Arc::new(AtomicBool::new(false));
    let closed_flag = Arc::clone(&closed);
    let app = WebApp::new(
        with_default_middlewares(Router::new().route("/ping", get(|| async { "pong" }))),
        0,
    )
    .with_shutdown_timeout(Duration::from_secs(5))
    .with_close_fn(move || async move {
        closed_flag.store(true, Ordering::SeqCst);
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    });
    let running = tokio::spawn(app.run_on(listener));

    // When
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream
        .write_all(b"GET /ping HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    AppContext::terminate();
    let outcome: Result<(), WebError> = running.await.unwrap();

    // Then
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.to_ascii_lowercase().contains("x-request-id:"));
    assert!(response.ends_with("pong"));
    assert!(outcome.is_ok());
    assert_eq!(closed.load(Ordering::SeqCst), true);
}
