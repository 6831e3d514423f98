use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    /// Request target as sent: `/v1/balance` for a direct request,
    /// `http://host/v1/balance` when the server is acting as a proxy.
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn body_as_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    pub fn is_absolute_form(&self) -> bool {
        self.target.starts_with("http://") || self.target.starts_with("https://")
    }
}

#[derive(Clone, Debug)]
pub struct MockResponse {
    status: u16,
    content_type: String,
    body: String,
}

impl MockResponse {
    /// `200` with an empty JSON object, the reply every test server defaults to.
    pub fn empty_json() -> Self {
        Self::json(serde_json::json!({}))
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json; charset=utf-8".to_string(),
            body: body.to_string(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn bad_request() -> Self {
        Self {
            status: 400,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: "Bad Request".to_string(),
        }
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::empty_json()
    }
}

struct MockServerState {
    response: MockResponse,
    request_count: AtomicUsize,
    recordings: Mutex<Vec<RecordedRequest>>,
}

impl MockServerState {
    fn record_request(&self, record: RecordedRequest) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn recordings(&self) -> Vec<RecordedRequest> {
        self.recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Mock API server on an ephemeral `127.0.0.1` port, served from a
/// background thread. Dropping it shuts the server down and joins that
/// thread, so the port is released by the time the value is gone.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start() -> std::io::Result<Self> {
        Self::with_response(MockResponse::default())
    }

    pub fn with_response(response: MockResponse) -> std::io::Result<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let state = Arc::new(MockServerState {
            response,
            request_count: AtomicUsize::new(0),
            recordings: Mutex::new(Vec::new()),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state_clone = state.clone();
        let thread = std::thread::Builder::new()
            .name(format!("mock-server-{}", addr.port()))
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => run_server(listener, state_clone, shutdown_rx).await,
                        Err(err) => {
                            tracing::error!(error = %err, "mock server could not adopt listener")
                        }
                    }
                });
            })?;

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.state.request_count.load(Ordering::SeqCst)
    }

    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.state.recordings()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop accepting connections and wait for the server thread to exit.
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(addr = %self.addr, "mock server thread panicked");
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_server(
    listener: TcpListener,
    state: Arc<MockServerState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let state_clone = state.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, state_clone).await {
                                tracing::debug!(error = %err, "mock server connection failed");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "mock server accept error");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    state: Arc<MockServerState>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut temp = [0u8; 1024];
    let mut head: Option<(usize, ParsedHead)> = None;

    loop {
        let n = stream.read(&mut temp).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&temp[..n]);

        if head.is_none() {
            if let Some(end) = find_header_end(&buffer) {
                match parse_request_head(&buffer[..end]) {
                    Ok(parsed) => head = Some((end, parsed)),
                    Err(err) => {
                        send_response(&MockResponse::bad_request(), &mut stream).await?;
                        return Err(err);
                    }
                }
            }
        }

        if let Some((end, parsed)) = &head {
            if buffer.len() >= end.saturating_add(parsed.content_length) {
                break;
            }
        }
    }

    let Some((header_end, parsed)) = head else {
        return Ok(());
    };

    let body_end = header_end
        .saturating_add(parsed.content_length)
        .min(buffer.len());
    state.record_request(RecordedRequest {
        method: parsed.method,
        target: parsed.target,
        headers: parsed.headers,
        body: buffer[header_end..body_end].to_vec(),
    });

    send_response(&state.response, &mut stream).await
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    const TERMINATOR: &[u8] = b"\r\n\r\n";
    buffer
        .windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
        .map(|idx| idx + TERMINATOR.len())
}

struct ParsedHead {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    content_length: usize,
}

fn invalid_head(reason: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, reason)
}

fn parse_request_head(head: &[u8]) -> std::io::Result<ParsedHead> {
    let head = std::str::from_utf8(head).map_err(|err| invalid_head(err.to_string()))?;
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();

    let (method, target) = match request_line.split_whitespace().collect::<Vec<_>>()[..] {
        [method, target, version] if version.starts_with("HTTP/") => (method, target),
        _ => {
            return Err(invalid_head(format!(
                "malformed request line: {:?}",
                request_line
            )))
        }
    };

    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid_head(format!("malformed header: {:?}", line)))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| invalid_head(format!("bad content-length: {:?}", value)))?,
        None => 0,
    };

    Ok(ParsedHead {
        method: method.to_string(),
        target: target.to_string(),
        headers,
        content_length,
    })
}

async fn send_response(response: &MockResponse, stream: &mut TcpStream) -> std::io::Result<()> {
    let reason = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown");

    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason,
        response.content_type,
        response.body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(response.body.as_bytes()).await?;
    stream.flush().await
}
