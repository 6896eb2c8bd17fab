//! SSE transport: HTTP GET event stream down, HTTP POST up.
//!
//! The downchannel is one long-lived GET with `Accept: text/event-stream`.
//! The server advertises its POST endpoint through a distinguished
//! `event: endpoint` frame; until that arrives, sends fail. Every other
//! event's `data:` payload is forwarded to the inbound message stream as
//! raw bytes, whatever the event name.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use url::Url;

use crate::core::error::{McpError, McpResult};
use crate::core::retry::with_timeout;
use crate::transport::traits::{check_frame_size, Transport, TransportConfig, TransportState};
use crate::utils::uri::resolve_same_origin;

/// Default SSE event name when no `event:` field was seen.
const DEFAULT_EVENT: &str = "message";
/// The one event name the transport interprets itself.
const ENDPOINT_EVENT: &str = "endpoint";

// ============================================================================
// SSE line parser
// ============================================================================

/// A parsed server-sent event relevant to the transport.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseEvent {
    /// `event: endpoint` payload, whitespace-trimmed
    Endpoint(String),
    /// Any other event's payload, preserved verbatim
    Message(Vec<u8>),
}

/// Incremental `event:`/`data:` line parser.
///
/// Chunks arrive at arbitrary boundaries; incomplete trailing lines are
/// buffered until the rest arrives. Each `data:` line yields one logical
/// frame immediately; blank lines reset the tracked event name.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: String,
    current_event: Option<String>,
}

impl SseParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body, returning any completed events.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates the event group
                self.current_event = None;
                continue;
            }
            if line.starts_with(':') {
                // SSE comment
                continue;
            }

            if let Some(name) = line.strip_prefix("event:") {
                self.current_event = Some(name.trim().to_string());
            } else if let Some(payload) = line.strip_prefix("data:") {
                // A single leading space after the colon belongs to the field
                // syntax, not the payload
                let payload = payload.strip_prefix(' ').unwrap_or(payload);
                let event = self.current_event.as_deref().unwrap_or(DEFAULT_EVENT);
                if event == ENDPOINT_EVENT {
                    events.push(SseEvent::Endpoint(payload.trim().to_string()));
                } else {
                    events.push(SseEvent::Message(payload.as_bytes().to_vec()));
                }
            }
            // Other fields (id:, retry:) are ignored
        }

        events
    }
}

// ============================================================================
// Transport
// ============================================================================

struct SseShared {
    message_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    state_tx: watch::Sender<TransportState>,
    post_endpoint: std::sync::RwLock<Option<Url>>,
}

impl SseShared {
    fn set_state(&self, state: TransportState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> TransportState {
        self.state_tx.borrow().clone()
    }

    fn close_stream(&self) {
        let mut guard = self.message_tx.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn set_endpoint(&self, url: Url) {
        let mut guard = self
            .post_endpoint
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = Some(url);
    }

    fn endpoint(&self) -> Option<Url> {
        self.post_endpoint
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Client transport over the MCP HTTP+SSE binding.
pub struct SseTransport {
    sse_url: Url,
    config: TransportConfig,
    client: reqwest::Client,
    shared: Arc<SseShared>,
    stream_task: Option<JoinHandle<()>>,
    session_id: String,
}

impl SseTransport {
    /// Create a transport for the given SSE URL with the default config.
    pub fn new(sse_url: &str) -> McpResult<Self> {
        Self::with_config(sse_url, TransportConfig::default())
    }

    /// Create a transport with a custom configuration. Headers from the
    /// config are attached to both the GET stream and every POST.
    pub fn with_config(sse_url: &str, config: TransportConfig) -> McpResult<Self> {
        let sse_url = Url::parse(sse_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| McpError::Http(format!("failed to create HTTP client: {e}")))?;

        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        Ok(Self {
            sse_url,
            config,
            client,
            shared: Arc::new(SseShared {
                message_tx: std::sync::Mutex::new(None),
                state_tx,
                post_endpoint: std::sync::RwLock::new(None),
            }),
            stream_task: None,
            session_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Opaque identifier for the current downchannel session. A new id is
    /// minted on every restart.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The POST endpoint advertised by the server, once known.
    pub fn post_endpoint(&self) -> Option<Url> {
        self.shared.endpoint()
    }

    fn stream_running(&self) -> bool {
        self.stream_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn spawn_stream(&mut self) {
        if self.stream_running() {
            return;
        }
        let client = self.client.clone();
        let url = self.sse_url.clone();
        let headers = self.config.headers.clone();
        let connect_timeout = self.config.connect_timeout;
        let shared = Arc::clone(&self.shared);
        self.stream_task = Some(tokio::spawn(async move {
            run_stream(client, url, headers, connect_timeout, shared).await;
        }));
    }
}

/// Drive one GET stream to completion.
async fn run_stream(
    client: reqwest::Client,
    sse_url: Url,
    headers: std::collections::HashMap<String, String>,
    connect_timeout: Duration,
    shared: Arc<SseShared>,
) {
    let mut request = client
        .get(sse_url.clone())
        .header("Accept", "text/event-stream");
    for (name, value) in &headers {
        request = request.header(name, value);
    }

    let response = match with_timeout("SSE connect", connect_timeout, async {
        request.send().await.map_err(McpError::from)
    })
    .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("SSE connection to {sse_url} failed: {e}");
            shared.close_stream();
            shared.set_state(TransportState::Failed(e.to_string()));
            return;
        }
    };

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !status.is_success() || !content_type.contains("text/event-stream") {
        let reason =
            format!("SSE connect to {sse_url} rejected: status {status}, content-type {content_type}");
        tracing::warn!("{reason}");
        shared.close_stream();
        shared.set_state(TransportState::Failed(reason));
        return;
    }

    tracing::debug!("SSE stream to {sse_url} established");
    shared.set_state(TransportState::Connected);

    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    let mut failed = false;

    'outer: while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                // Mid-stream errors end the session like a server close
                tracing::debug!("SSE stream from {sse_url} interrupted: {e}");
                break;
            }
        };

        for event in parser.push(&bytes) {
            match event {
                SseEvent::Endpoint(raw) => match resolve_same_origin(&sse_url, &raw) {
                    Ok(endpoint) => {
                        tracing::debug!("server advertised POST endpoint: {endpoint}");
                        shared.set_endpoint(endpoint);
                    }
                    Err(e) => {
                        tracing::error!("rejecting endpoint event '{raw}': {e}");
                        shared.set_state(TransportState::Failed(e.to_string()));
                        failed = true;
                        break 'outer;
                    }
                },
                SseEvent::Message(payload) => {
                    let sent = {
                        let guard = shared.message_tx.lock().unwrap_or_else(|e| e.into_inner());
                        match guard.as_ref() {
                            Some(tx) => tx.send(payload).is_ok(),
                            None => false,
                        }
                    };
                    if !sent {
                        tracing::debug!("message consumer dropped, closing SSE stream");
                        break 'outer;
                    }
                }
            }
        }
    }

    shared.close_stream();
    if !failed && shared.state() == TransportState::Connected {
        tracing::debug!("SSE stream from {sse_url} ended");
        shared.set_state(TransportState::Disconnected);
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&mut self) -> McpResult<()> {
        if self.shared.state() == TransportState::Connected {
            return Ok(());
        }

        // Fresh session: new id, forget the old endpoint
        self.session_id = uuid::Uuid::new_v4().to_string();
        {
            let mut guard = self
                .shared
                .post_endpoint
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *guard = None;
        }
        self.shared.set_state(TransportState::Connecting);

        // The GET itself is initiated by the messages() subscription; if a
        // subscriber already exists, resume the stream now
        let has_subscriber = {
            let guard = self
                .shared
                .message_tx
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            guard.is_some()
        };
        if has_subscriber {
            self.spawn_stream();
        }
        Ok(())
    }

    async fn stop(&mut self) -> McpResult<()> {
        tracing::debug!("stopping SSE transport for {}", self.sse_url);
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.shared.close_stream();
        self.shared.set_state(TransportState::Disconnected);
        Ok(())
    }

    async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> McpResult<()> {
        if self.shared.state() != TransportState::Connected {
            return Err(McpError::invalid_state("not connected"));
        }
        check_frame_size(data, &self.config)?;

        let endpoint = self
            .shared
            .endpoint()
            .ok_or_else(|| McpError::invalid_state("server endpoint not known yet"))?;

        let mut request = self
            .client
            .post(endpoint.clone())
            .header("Content-Type", "application/json")
            .body(data.to_vec());
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let deadline = timeout.unwrap_or(self.config.send_timeout);
        let response = with_timeout("SSE send", deadline, async {
            request.send().await.map_err(McpError::from)
        })
        .await?;

        if !response.status().is_success() {
            return Err(McpError::invalid_state(format!(
                "POST failed to {endpoint}: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn messages(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut guard = self
                .shared
                .message_tx
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *guard = Some(tx);
        }

        // Subscribing drives the lazy connection
        if self.shared.state() == TransportState::Disconnected {
            self.shared.set_state(TransportState::Connecting);
        }
        if self.shared.state() == TransportState::Connecting {
            self.spawn_stream();
        }
        rx
    }

    fn state(&self) -> TransportState {
        self.shared.state()
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.shared.state_tx.subscribe()
    }

    fn connection_info(&self) -> String {
        format!(
            "SSE transport {} (session {}, {:?})",
            self.sse_url,
            self.session_id,
            self.state()
        )
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
    }
}
