//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use campus_access::classify::{BackendResponse, RawFailure, TransportKind};
use campus_access::config::AccessConfig;
use campus_access::facade::{BackendCall, Reply};
use campus_access::reauth::{ReauthError, ReauthStrategy};
use campus_access::session::{CredentialView, Session};
use campus_access::storage::MemoryStorage;
use campus_access::{AccessLayer, BackendId, Credential};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.to_string(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".into(), location.into())],
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// Returns its address and the log of requests it received.
pub async fn start_mock_backend<F>(handler: F) -> (SocketAddr, Arc<Mutex<Vec<MockRequest>>>)
where
    F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let requests = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                let _ = serve(socket, handler.as_ref(), &requests).await;
            });
        }
    });

    (addr, log)
}

async fn serve<F>(
    mut socket: TcpStream,
    handler: &F,
    log: &Mutex<Vec<MockRequest>>,
) -> std::io::Result<()>
where
    F: Fn(&MockRequest) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request = MockRequest {
        method,
        path,
        headers,
        body,
    };
    let response = handler(&request);
    log.lock().unwrap().push(request);

    let mut out = format!("HTTP/1.1 {} Mock\r\n", response.status);
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.body.len(),
        response.body
    ));
    socket.write_all(out.as_bytes()).await?;
    socket.shutdown().await
}

/// A backend call that only accepts one credential.
///
/// Answers `"{params}@{credential}"`, a 401 for any other credential, and a
/// connection failure while offline.
pub struct FakeCall {
    backend: BackendId,
    accepted: Mutex<String>,
    offline: AtomicBool,
    business_code: Mutex<Option<String>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl FakeCall {
    pub fn new(backend: BackendId, accepted: &str) -> Self {
        Self {
            backend,
            accepted: Mutex::new(accepted.to_string()),
            offline: AtomicBool::new(false),
            business_code: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every later call with a 200 envelope carrying `code`.
    pub fn fail_with_code(&self, code: &str) {
        *self.business_code.lock().unwrap() = Some(code.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendCall for FakeCall {
    type Params = String;
    type Output = String;

    fn backend(&self) -> BackendId {
        self.backend
    }

    fn name(&self) -> &str {
        "fake"
    }

    async fn call(
        &self,
        params: &String,
        credentials: &CredentialView,
    ) -> Result<Reply<String>, RawFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RawFailure::Transport {
                kind: TransportKind::Connect,
                message: "connection refused".into(),
            });
        }

        if let Some(code) = self.business_code.lock().unwrap().clone() {
            let body = serde_json::json!({ "code": code, "message": "server busy" });
            return Err(BackendResponse::new(self.backend, 200, body.to_string()).into());
        }

        let accepted = self.accepted.lock().unwrap().clone();
        match credentials.credential(self.backend) {
            Some(credential) if credential.expose() == accepted => {
                Ok(Reply::new(format!("{params}@{accepted}")))
            }
            _ => Err(BackendResponse::new(self.backend, 401, "unauthorized").into()),
        }
    }
}

/// A re-login strategy with a scripted outcome.
pub struct FakeStrategy {
    outcome: Result<String, ReauthError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeStrategy {
    pub fn issuing(credential: &str) -> Self {
        Self {
            outcome: Ok(credential.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ReauthError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReauthStrategy for FakeStrategy {
    async fn reauthenticate(
        &self,
        _backend: BackendId,
        _session: &Session,
    ) -> Result<Credential, ReauthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone().map(Credential::new)
    }
}

/// An access layer over in-memory storage with `strategy` for the primary backend.
pub async fn layer_with(strategy: Arc<FakeStrategy>) -> AccessLayer {
    AccessLayer::builder(AccessConfig::default())
        .storage(Arc::new(MemoryStorage::new()))
        .strategy(BackendId::Primary, strategy)
        .build()
        .await
        .unwrap()
}
