//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use service_bridge::broker::{Broker, MemoryBroker, ReplyEnvelope, RequestEnvelope};
use service_bridge::config::{BackoffConfig, BridgeConfig, CallMode, DependencyConfig};

/// Dependency config with fast, deterministic policies for tests.
pub fn dependency(name: &str, mode: CallMode) -> DependencyConfig {
    let mut config = DependencyConfig::new(name, mode);
    config.deadline_ms = 2_000;
    config.retry.max_attempts = 1;
    config.retry.backoff = BackoffConfig::Fixed { delay_ms: 100 };
    config
}

/// Bridge config with a single dependency.
pub fn bridge_config(dependency: DependencyConfig) -> BridgeConfig {
    BridgeConfig {
        dependencies: vec![dependency],
        ..BridgeConfig::default()
    }
}

/// Read one HTTP/1.1 request (headers plus `Content-Length` body) and return the body.
async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            while buf.len() < body_start + length {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            return buf[body_start.min(buf.len())..].to_vec();
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return Vec::new(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Start a programmable mock callee with async support.
///
/// Every request is answered with the `(status, body)` the closure returns.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let _ = read_request(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            422 => "422 Unprocessable Entity",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a mock callee that answers every request with its own body.
pub async fn start_echo_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let body = read_request(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// What a scripted responder does with one request.
pub enum Script {
    /// Reply with this payload after the delay.
    Reply(Duration, Bytes),
    /// Reply with an error marker after the delay.
    Fail(Duration, String),
    /// Never reply.
    Ignore,
}

/// Answer requests on `request_topic` according to `script`.
///
/// The closure sees each request and its 0-based arrival index. Subscribes
/// before returning, so requests published afterwards are never missed.
pub async fn start_scripted_responder<F>(
    broker: Arc<MemoryBroker>,
    request_topic: &str,
    reply_topic: &str,
    script: F,
) -> JoinHandle<()>
where
    F: Fn(&RequestEnvelope, usize) -> Script + Send + Sync + 'static,
{
    let mut requests = broker.subscribe(request_topic).await.unwrap();
    let reply_topic = reply_topic.to_string();

    tokio::spawn(async move {
        let mut index = 0;
        while let Some(raw) = requests.next().await {
            let request = RequestEnvelope::from_slice(&raw).unwrap();
            let action = script(&request, index);
            index += 1;

            let (delay, reply) = match action {
                Script::Reply(delay, payload) => (delay, ReplyEnvelope::success(request.correlation_id, payload)),
                Script::Fail(delay, marker) => (delay, ReplyEnvelope::failure(request.correlation_id, marker)),
                Script::Ignore => continue,
            };

            let broker = broker.clone();
            let reply_topic = reply_topic.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let key = reply.correlation_id.as_str().to_string();
                let _ = broker
                    .publish(&reply_topic, &key, reply.to_bytes().unwrap())
                    .await;
            });
        }
    })
}
