// MIT License - Copyright (c) 2026 tapper-bridge contributors

//! Minimal HTTP stub standing in for an ESP32 tapper on the bench.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct StubDevice {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl StubDevice {
    /// Spawn a stub that reports `status_body` from `GET /status`.
    pub async fn spawn(status_body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, status_body, log).await;
                });
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Recorded requests as "METHOD target[ body]" strings.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubDevice {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    status_body: &'static str,
    log: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (method, target, body) = read_request(&mut stream).await?;

    let entry = if body.is_empty() {
        format!("{method} {target}")
    } else {
        format!("{method} {target} {body}")
    };
    log.lock().unwrap().push(entry);

    let path = target.split('?').next().unwrap_or(&target);
    let (code, content_type, payload) = match (method.as_str(), path) {
        ("GET", "/status") => ("200 OK", "text/plain", status_body.to_string()),
        ("POST", "/command") => ("200 OK", "application/json", r#"{"result":"ok"}"#.to_string()),
        ("POST", "/extend_for_time") | ("POST", "/retract_for_time") => {
            ("200 OK", "text/plain", "OK\n".to_string())
        }
        ("GET", "/boom") => ("500 Internal Server Error", "text/plain", "fail".to_string()),
        ("GET", "/slow") => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ("200 OK", "text/plain", "late".to_string())
        }
        _ => ("200 OK", "text/plain", "OK".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {code}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Read one request: line, headers (for Content-Length), then the body.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<(String, String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = (header_end + 4).min(buf.len());
    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Ok((method, target, String::from_utf8_lossy(&body).to_string()))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
