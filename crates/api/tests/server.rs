//! Live server tests over real sockets

mod common;

use std::time::Duration;

use api::{HttpServer, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn local_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

async fn read_until(stream: &mut TcpStream, needle: &[u8], count: usize) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 8192];
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed early");
            received.extend_from_slice(&buf[..n]);
            let found = received
                .windows(needle.len())
                .filter(|w| *w == needle)
                .count();
            if found >= count {
                break;
            }
        }
    })
    .await
    .expect("timed out reading stream");
    received
}

#[tokio::test]
async fn test_status_over_http() {
    let server = HttpServer::start(local_config(), None).await.unwrap();
    assert!(server.is_running());

    let url = format!("http://{}/status", server.local_addr());
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.stop().await;
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_malformed_request_line() {
    let server = HttpServer::start(local_config(), None).await.unwrap();
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream.write_all(b"GARBAGE\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 400"));
    server.stop().await;
}

#[tokio::test]
async fn test_stream_parts_are_framed() {
    let manager = common::live_manager().await;
    let server = HttpServer::start(local_config(), Some(manager)).await.unwrap();

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream
        .write_all(b"GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let received = read_until(&mut stream, b"--frame\r\n", 2).await;
    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("HTTP/1.1 200"));
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("Content-Type: image/jpeg\r\nContent-Length: "));

    drop(stream);
    server.stop().await;
}

#[tokio::test]
async fn test_stop_ends_open_streams() {
    let server = HttpServer::start(local_config(), None).await.unwrap();

    // No frames: the stream only waits, and shutdown must still end it
    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream
        .write_all(b"GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    read_until(&mut stream, b"\r\n\r\n", 1).await;

    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .expect("stop hung on an open stream");
    assert!(!server.is_running());

    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await;
    assert!(read.is_ok(), "stream connection stayed open");
}

#[tokio::test]
async fn test_rebinding_capture_manager() {
    let server = HttpServer::start(local_config(), None).await.unwrap();
    let url = format!("http://{}/snapshot", server.local_addr());

    assert_eq!(reqwest::get(&url).await.unwrap().status(), 404);

    server
        .set_capture_manager(Some(common::live_manager().await))
        .await;
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    server.stop().await;
}
