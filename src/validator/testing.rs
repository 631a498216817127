//! In-memory network fixtures for validator tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::error::{HunterError, Result};

use super::transport::{Connector, ProxyStream};

/// What the remote end of a scripted connection does
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Connection refused
    Refuse,
    /// Connect never completes
    Hang,
    /// Panics inside `connect`
    Panic,
    /// SOCKS5 server granting every CONNECT
    Socks5,
    /// SOCKS4 server granting every CONNECT
    Socks4,
    /// HTTP forward proxy in front of the echo services
    Http(HttpScript),
    /// Plain HTTP server answering every request the same way
    Respond { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct HttpScript {
    /// Address the echo services see
    pub observed_ip: String,
    /// Status returned for IP-echo requests
    pub echo_status: u16,
    /// Headers the proxy injects into forwarded requests
    pub added_headers: Vec<(String, String)>,
    /// Whether the client's own spoof headers survive the hop
    pub forward_client_headers: bool,
    /// Queued statuses per target fragment, consumed before `echo_status`
    pub queued_statuses: Arc<Mutex<HashMap<String, VecDeque<u16>>>>,
}

impl HttpScript {
    fn new(observed_ip: &str) -> Self {
        Self {
            observed_ip: observed_ip.to_string(),
            echo_status: 200,
            added_headers: Vec::new(),
            forward_client_headers: false,
            queued_statuses: Arc::default(),
        }
    }

    fn status_for(&self, target: &str) -> u16 {
        let mut queued = self.queued_statuses.lock();
        queued
            .iter_mut()
            .find(|(fragment, _)| target.contains(fragment.as_str()))
            .and_then(|(_, statuses)| statuses.pop_front())
            .unwrap_or(self.echo_status)
    }
}

impl Behavior {
    pub fn http_proxy(observed_ip: &str) -> Self {
        Behavior::Http(HttpScript::new(observed_ip))
    }

    pub fn leaky_proxy(observed_ip: &str, headers: &[(&str, &str)]) -> Self {
        Behavior::Http(HttpScript {
            added_headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..HttpScript::new(observed_ip)
        })
    }

    /// Relays the client's headers untouched
    pub fn pass_through_proxy(observed_ip: &str) -> Self {
        Behavior::Http(HttpScript {
            forward_client_headers: true,
            ..HttpScript::new(observed_ip)
        })
    }

    /// Every IP-echo request is answered with `status`
    pub fn echo_status(self, status: u16) -> Self {
        match self {
            Behavior::Http(script) => Behavior::Http(HttpScript {
                echo_status: status,
                ..script
            }),
            other => other,
        }
    }

    /// The next requests whose target contains `fragment` get `statuses`, in order
    pub fn queue_statuses(self, fragment: &str, statuses: &[u16]) -> Self {
        if let Behavior::Http(script) = &self {
            script
                .queued_statuses
                .lock()
                .insert(fragment.to_string(), statuses.iter().copied().collect());
        }
        self
    }

    pub fn respond(status: u16, body: &str) -> Self {
        Behavior::Respond {
            status,
            body: body.to_string(),
        }
    }
}

/// A request observed by a scripted server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub addr: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Connector serving scripted behaviors over `tokio::io::duplex`
///
/// Unknown addresses refuse the connection. Every `connect` call is counted.
#[derive(Default)]
pub struct ScriptedConnector {
    behaviors: HashMap<String, Behavior>,
    connects: Arc<Mutex<HashMap<String, usize>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, port: u16, behavior: Behavior) -> Self {
        self.behaviors.insert(format!("{}:{}", host, port), behavior);
        self
    }

    pub fn connects_to(&self, host: &str, port: u16) -> usize {
        self.connects
            .lock()
            .get(&format!("{}:{}", host, port))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.connects.lock().values().sum()
    }

    pub fn requests_to(&self, host: &str, port: u16) -> Vec<RecordedRequest> {
        let addr = format!("{}:{}", host, port);
        self.requests
            .lock()
            .iter()
            .filter(|r| r.addr == addr)
            .cloned()
            .collect()
    }

    pub fn last_request_target(&self, host: &str, port: u16) -> Option<String> {
        self.requests_to(host, port).pop().map(|r| r.target)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ProxyStream>> {
        let addr = format!("{}:{}", host, port);
        *self.connects.lock().entry(addr.clone()).or_insert(0) += 1;

        let behavior = self
            .behaviors
            .get(&addr)
            .cloned()
            .unwrap_or(Behavior::Refuse);

        match behavior {
            Behavior::Refuse => Err(HunterError::ProxyConnectionFailed(format!(
                "connection refused: {}",
                addr
            ))),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Panic => panic!("scripted panic while connecting to {}", addr),
            other => {
                let (client, server) = tokio::io::duplex(64 * 1024);
                let requests = self.requests.clone();
                tokio::spawn(serve(other, server, addr, requests));
                Ok(Box::new(client))
            }
        }
    }
}

async fn serve(
    behavior: Behavior,
    mut io: DuplexStream,
    addr: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    match behavior {
        Behavior::Socks5 => {
            let _ = serve_socks5(&mut io).await;
        }
        Behavior::Socks4 => {
            let _ = serve_socks4(&mut io).await;
        }
        Behavior::Http(script) => {
            let Some(request) = read_request(&mut io, &addr).await else {
                return;
            };
            let (status, body) = proxy_response(&script, &request);
            requests.lock().push(request);
            let _ = write_response(&mut io, status, &body).await;
        }
        Behavior::Respond { status, body } => {
            let Some(request) = read_request(&mut io, &addr).await else {
                return;
            };
            requests.lock().push(request);
            let _ = write_response(&mut io, status, &body).await;
        }
        Behavior::Refuse | Behavior::Hang | Behavior::Panic => {}
    }
}

async fn serve_socks5(io: &mut DuplexStream) -> std::io::Result<()> {
    let mut version = [0u8; 1];
    io.read_exact(&mut version).await?;
    if version[0] != 0x05 {
        return Ok(());
    }
    let mut methods = [0u8; 2];
    io.read_exact(&mut methods).await?;
    io.write_all(&[0x05, 0x00]).await?;

    let mut request = [0u8; 10];
    io.read_exact(&mut request).await?;
    io.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await
}

async fn serve_socks4(io: &mut DuplexStream) -> std::io::Result<()> {
    let mut version = [0u8; 1];
    io.read_exact(&mut version).await?;
    if version[0] != 0x04 {
        return Ok(());
    }
    let mut rest = [0u8; 8];
    io.read_exact(&mut rest).await?;
    io.write_all(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0]).await
}

async fn read_request(io: &mut DuplexStream, addr: &str) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head = loop {
        let n = io.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        if !buf[0].is_ascii_uppercase() || buf.len() > 16 * 1024 {
            return None;
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break String::from_utf8_lossy(&buf[..pos]).into_owned();
        }
    };

    let mut lines = head.split("\r\n");
    let target = lines.next()?.split_whitespace().nth(1)?.to_string();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Some(RecordedRequest {
        addr: addr.to_string(),
        target,
        headers,
    })
}

fn proxy_response(script: &HttpScript, request: &RecordedRequest) -> (u16, String) {
    if request.target.ends_with("/headers") {
        let mut echoed = serde_json::Map::new();
        for (k, v) in &request.headers {
            let spoof = ["x-real-ip", "x-forwarded-for", "via"]
                .iter()
                .any(|h| k.eq_ignore_ascii_case(h));
            if !spoof || script.forward_client_headers {
                echoed.insert(k.clone(), serde_json::Value::String(v.clone()));
            }
        }
        for (k, v) in &script.added_headers {
            echoed.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        let body = serde_json::json!({ "headers": echoed }).to_string();
        return (200, body);
    }

    let body = if request.target.contains("httpbin") {
        serde_json::json!({ "origin": script.observed_ip }).to_string()
    } else {
        format!("{}\n", script.observed_ip)
    };
    (script.status_for(&request.target), body)
}

async fn write_response(io: &mut DuplexStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    io.write_all(response.as_bytes()).await?;
    io.shutdown().await
}
