//! The MCP endpoint: one connection's protocol state machine.
//!
//! The endpoint turns a byte-stream transport into a correlated, typed,
//! cancellable request/response system. It owns the initialize handshake,
//! the pending-request table, progress routing, capability gating, and the
//! dispatch of server-initiated requests. Inbound frames are consumed by a
//! single reader task; public methods enqueue work and await completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::request_handler::{RootsProvider, ServerRequestDispatcher};
use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::*;
use crate::protocol::methods;
use crate::protocol::types::*;
use crate::protocol::validation::{decode_message, IncomingMessage};
use crate::transport::traits::{Transport, TransportState};

/// Buffered notifications per subscriber. Slow subscribers that fall more
/// than this far behind drop the oldest messages rather than blocking the
/// router.
const NOTIFICATION_BUFFER: usize = 256;

/// Callback invoked for progress notifications: `(progress, total)`.
pub type ProgressHandler = Arc<dyn Fn(f64, Option<f64>) + Send + Sync>;

/// Observable lifecycle state of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointState {
    /// No transport attached
    Disconnected,
    /// Transport starting
    Connecting,
    /// Transport up, initialize handshake in flight
    Initializing,
    /// Handshake complete, requests accepted
    Running {
        /// Info the server reported at initialize
        server_info: Implementation,
        /// Capabilities negotiated at initialize
        capabilities: ServerCapabilities,
    },
    /// Terminal failure
    Failed(String),
}

impl EndpointState {
    /// Whether the endpoint accepts outbound requests.
    pub fn is_running(&self) -> bool {
        matches!(self, EndpointState::Running { .. })
    }
}

/// Tunables for an endpoint, assembled by the builder.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Identity sent in the initialize request
    pub client_info: Implementation,
    /// Protocol versions accepted from the server
    pub protocol_versions: Vec<String>,
    /// Cap on the initialize handshake
    pub connect_timeout: Duration,
    /// Per-request deadline
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("harbor-mcp", env!("CARGO_PKG_VERSION")),
            protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

struct PendingRequest {
    completer: oneshot::Sender<McpResult<Value>>,
    progress_token: Option<ProgressToken>,
    method: String,
}

/// An in-flight request: its id plus the completion channel.
pub struct PendingCall {
    /// The id the request went out with
    pub id: RequestId,
    receiver: oneshot::Receiver<McpResult<Value>>,
    method: String,
}

struct EndpointInner {
    config: EndpointConfig,
    client_capabilities: ClientCapabilities,
    dispatcher: ServerRequestDispatcher,
    roots: Option<RootsProvider>,
    transport: tokio::sync::Mutex<Option<Box<dyn Transport>>>,
    pending: std::sync::Mutex<HashMap<RequestId, PendingRequest>>,
    progress: std::sync::Mutex<HashMap<ProgressToken, ProgressHandler>>,
    state_tx: watch::Sender<EndpointState>,
    notifications_tx: broadcast::Sender<JsonRpcNotification>,
    next_id: AtomicI64,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    last_notified_roots: std::sync::Mutex<Option<Vec<Root>>>,
}

impl EndpointInner {
    fn state(&self) -> EndpointState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&self, state: EndpointState) {
        self.state_tx.send_replace(state);
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn take_pending(&self, id: &RequestId) -> Option<PendingRequest> {
        let record = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(id)
        };
        if let Some(record) = &record {
            if let Some(token) = &record.progress_token {
                let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
                progress.remove(token);
            }
        }
        record
    }

    /// Resume every waiting caller with the same terminal error.
    fn fail_all_pending(&self, error: &McpError) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().map(|(_, record)| record).collect()
        };
        {
            let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
            progress.clear();
        }
        for record in drained {
            let _ = record.completer.send(Err(error.clone()));
        }
    }

    async fn write_frame(&self, bytes: &[u8]) -> McpResult<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard
            .as_mut()
            .ok_or_else(|| McpError::invalid_state("no transport attached"))?;
        transport.send(bytes, None).await
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params)?;
        let bytes = serde_json::to_vec(&notification)?;
        self.write_frame(&bytes).await
    }

    /// Best-effort cancellation notification; failures only get logged.
    async fn notify_cancelled(&self, id: &RequestId, reason: Option<String>) {
        let params = CancelledParams {
            request_id: id.clone(),
            reason,
        };
        match serde_json::to_value(&params) {
            Ok(value) => {
                if let Err(e) = self.send_notification(methods::CANCELLED, Some(value)).await {
                    tracing::debug!("could not send cancellation for {id}: {e}");
                }
            }
            Err(e) => tracing::debug!("could not encode cancellation for {id}: {e}"),
        }
    }
}

/// One MCP connection's client machine.
///
/// Cloning is shallow: clones share the same connection.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    /// Create an endpoint with default configuration and no server-request
    /// handlers beyond ping.
    pub fn new(client_info: Implementation) -> Self {
        let config = EndpointConfig {
            client_info,
            ..Default::default()
        };
        Self::with_parts(config, ServerRequestDispatcher::new(), None)
    }

    pub(crate) fn with_parts(
        config: EndpointConfig,
        dispatcher: ServerRequestDispatcher,
        roots: Option<RootsProvider>,
    ) -> Self {
        // Capabilities follow from what is configured: a roots provider
        // advertises roots with change notifications, a sampling handler
        // advertises sampling.
        let client_capabilities = ClientCapabilities {
            roots: dispatcher.has_roots().then(|| RootsCapability {
                list_changed: Some(true),
            }),
            sampling: dispatcher.has_sampling().then(SamplingCapability::default),
            experimental: None,
        };

        let (state_tx, _) = watch::channel(EndpointState::Disconnected);
        let (notifications_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);

        Self {
            inner: Arc::new(EndpointInner {
                config,
                client_capabilities,
                dispatcher,
                roots,
                transport: tokio::sync::Mutex::new(None),
                pending: std::sync::Mutex::new(HashMap::new()),
                progress: std::sync::Mutex::new(HashMap::new()),
                state_tx,
                notifications_tx,
                next_id: AtomicI64::new(1),
                reader_task: std::sync::Mutex::new(None),
                last_notified_roots: std::sync::Mutex::new(None),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attach a transport, run the initialize handshake, and transition to
    /// running.
    ///
    /// On handshake failure the endpoint ends up `Failed` and the transport
    /// is stopped.
    pub async fn start<T: Transport + 'static>(&self, transport: T) -> McpResult<InitializeResult> {
        match self.state() {
            EndpointState::Disconnected | EndpointState::Failed(_) => {}
            state => {
                return Err(McpError::invalid_state(format!(
                    "endpoint already started ({state:?})"
                )));
            }
        }

        self.inner.set_state(EndpointState::Connecting);

        let mut transport: Box<dyn Transport> = Box::new(transport);
        // Subscribe before starting so no inbound frame is lost
        let messages = transport.messages();
        if let Err(e) = transport.start().await {
            self.inner.set_state(EndpointState::Failed(e.to_string()));
            return Err(e);
        }
        *self.inner.transport.lock().await = Some(transport);

        let reader_inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            run_reader(reader_inner, messages).await;
        });
        {
            let mut guard = self
                .inner
                .reader_task
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *guard = Some(handle);
        }

        self.inner.set_state(EndpointState::Initializing);

        match self.initialize_handshake().await {
            Ok(result) => {
                // Baseline for roots change detection
                if let Some(provider) = &self.inner.roots {
                    let mut last = self
                        .inner
                        .last_notified_roots
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    *last = Some(provider.current());
                }
                self.inner.set_state(EndpointState::Running {
                    server_info: result.server_info.clone(),
                    capabilities: result.capabilities.clone(),
                });
                tracing::debug!(
                    "endpoint running against {} v{}",
                    result.server_info.name,
                    result.server_info.version
                );
                Ok(result)
            }
            Err(error) => {
                self.inner.set_state(EndpointState::Failed(error.to_string()));
                self.teardown().await;
                Err(error)
            }
        }
    }

    /// Stop the endpoint: fail outstanding requests, stop the transport,
    /// end the reader. Idempotent.
    pub async fn stop(&self) -> McpResult<()> {
        self.inner.set_state(EndpointState::Disconnected);
        self.inner
            .fail_all_pending(&McpError::ConnectionClosed("endpoint stopped".to_string()));
        self.teardown().await;
        Ok(())
    }

    async fn teardown(&self) {
        let handle = {
            let mut guard = self
                .inner
                .reader_task
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        let transport = { self.inner.transport.lock().await.take() };
        if let Some(mut transport) = transport {
            if let Err(e) = transport.stop().await {
                tracing::warn!("transport stop failed: {e}");
            }
        }
    }

    async fn initialize_handshake(&self) -> McpResult<InitializeResult> {
        let params = InitializeParams::new(
            LATEST_PROTOCOL_VERSION.to_string(),
            self.inner.client_capabilities.clone(),
            self.inner.config.client_info.clone(),
        );
        let call = self
            .start_request(methods::INITIALIZE, Some(serde_json::to_value(&params)?), None)
            .await?;
        let call_id = call.id.clone();

        let value = match tokio::time::timeout(self.inner.config.connect_timeout, call.receiver)
            .await
        {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(McpError::ConnectionClosed(
                    "connection closed during initialize".to_string(),
                ));
            }
            Err(_) => {
                self.inner.take_pending(&call_id);
                return Err(McpError::timeout("initialize handshake timed out"));
            }
        };

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|_| McpError::internal("unexpected response type for initialize"))?;

        if !self
            .inner
            .config
            .protocol_versions
            .iter()
            .any(|v| v == &result.protocol_version)
        {
            return Err(McpError::invalid_request(format!(
                "version unsupported: {}",
                result.protocol_version
            )));
        }

        self.inner
            .send_notification(methods::INITIALIZED, None)
            .await?;
        Ok(result)
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> EndpointState {
        self.inner.state()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<EndpointState> {
        self.inner.state_tx.subscribe()
    }

    /// Info the server reported at initialize, once running.
    pub fn server_info(&self) -> Option<Implementation> {
        match self.state() {
            EndpointState::Running { server_info, .. } => Some(server_info),
            _ => None,
        }
    }

    /// Capabilities negotiated at initialize, once running.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        match self.state() {
            EndpointState::Running { capabilities, .. } => Some(capabilities),
            _ => None,
        }
    }

    /// The capabilities this client advertised.
    pub fn client_capabilities(&self) -> &ClientCapabilities {
        &self.inner.client_capabilities
    }

    /// Subscribe to server notifications other than progress and cancelled.
    ///
    /// The stream is lossy for slow subscribers: when a subscriber lags more
    /// than the buffer size it misses the oldest notifications and observes
    /// a `Lagged` error rather than blocking the connection.
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.inner.notifications_tx.subscribe()
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    /// Send a request without waiting for the response; the returned call
    /// exposes the id for cancellation.
    pub async fn start_request(
        &self,
        method: &str,
        params: Option<Value>,
        progress: Option<ProgressHandler>,
    ) -> McpResult<PendingCall> {
        let id = self.inner.next_request_id();

        let (params, progress_token) = match progress {
            Some(handler) => {
                let token = ProgressToken::from(id.clone());
                let params = inject_progress_token(params, &token)?;
                {
                    let mut map = self
                        .inner
                        .progress
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    map.insert(token.clone(), handler);
                }
                (Some(params), Some(token))
            }
            None => (params, None),
        };

        let request = JsonRpcRequest::new(id.clone(), method, params)?;
        let bytes = serde_json::to_vec(&request)?;

        let (completer, receiver) = oneshot::channel();
        {
            let mut pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            pending.insert(
                id.clone(),
                PendingRequest {
                    completer,
                    progress_token,
                    method: method.to_string(),
                },
            );
        }

        if let Err(error) = self.inner.write_frame(&bytes).await {
            self.inner.take_pending(&id);
            return Err(error);
        }

        Ok(PendingCall {
            id,
            receiver,
            method: method.to_string(),
        })
    }

    /// Await a call started with [`Endpoint::start_request`].
    ///
    /// A deadline miss removes the record, sends a best-effort cancellation
    /// notification (a timeout is a cancellation), and surfaces
    /// [`McpError::RequestTimeout`].
    pub async fn await_call(&self, call: PendingCall) -> McpResult<Value> {
        let deadline = self.inner.config.request_timeout;
        match tokio::time::timeout(deadline, call.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::ConnectionClosed(
                "connection closed before the response arrived".to_string(),
            )),
            Err(_) => {
                if self.inner.take_pending(&call.id).is_some() {
                    self.inner
                        .notify_cancelled(&call.id, Some("timeout".to_string()))
                        .await;
                }
                Err(McpError::RequestTimeout(format!(
                    "{} after {deadline:?}",
                    call.method
                )))
            }
        }
    }

    /// Cancel a pending request: the local record resolves immediately and a
    /// best-effort `notifications/cancelled` goes out.
    pub async fn cancel_request(&self, id: &RequestId, reason: Option<String>) {
        if let Some(record) = self.inner.take_pending(id) {
            let _ = record.completer.send(Err(McpError::internal("cancelled")));
            self.inner.notify_cancelled(id, reason).await;
        }
    }

    /// Send a request and await its typed result.
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> McpResult<R> {
        self.call_method(
            method,
            params.map(|p| serde_json::to_value(p)).transpose()?,
            None,
        )
        .await
    }

    /// Send a notification to the server.
    pub async fn notify<P: Serialize>(&self, method: &str, params: Option<P>) -> McpResult<()> {
        match self.state() {
            EndpointState::Running { .. } | EndpointState::Initializing => {}
            state => {
                return Err(McpError::invalid_state(format!(
                    "cannot notify while {state:?}"
                )));
            }
        }
        let params = params.map(|p| serde_json::to_value(p)).transpose()?;
        self.inner.send_notification(method, params).await
    }

    async fn call_method<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        progress: Option<ProgressHandler>,
    ) -> McpResult<R> {
        let value = self.call_value(method, params, progress).await?;
        serde_json::from_value(value)
            .map_err(|_| McpError::internal(format!("unexpected response type for {method}")))
    }

    async fn call_value(
        &self,
        method: &str,
        params: Option<Value>,
        progress: Option<ProgressHandler>,
    ) -> McpResult<Value> {
        let capabilities = match self.state() {
            EndpointState::Running { capabilities, .. } => capabilities,
            _ => return Err(McpError::internal("not running")),
        };

        if let Some(required) = methods::required_capability(method) {
            if !required.advertised_by(&capabilities) {
                return Err(McpError::invalid_request(format!(
                    "server does not support {}",
                    required.feature_name()
                )));
            }
        }

        let call = self.start_request(method, params, progress).await?;
        self.await_call(call).await
    }

    // ========================================================================
    // Typed operations
    // ========================================================================

    /// Send a ping.
    pub async fn ping(&self) -> McpResult<PingResult> {
        self.call_method(methods::PING, None, None).await
    }

    /// List tools, optionally from a pagination cursor.
    pub async fn list_tools(&self, cursor: Option<Cursor>) -> McpResult<ListToolsResult> {
        let params = ListToolsParams { cursor, meta: None };
        self.call_method(methods::TOOLS_LIST, Some(serde_json::to_value(params)?), None)
            .await
    }

    /// Call a tool.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, Value>>,
    ) -> McpResult<CallToolResult> {
        let params = match arguments {
            Some(arguments) => CallToolParams::with_arguments(name, arguments),
            None => CallToolParams::new(name),
        };
        self.call_method(methods::TOOLS_CALL, Some(serde_json::to_value(params)?), None)
            .await
    }

    /// Call a tool and receive progress notifications while it runs.
    ///
    /// The handler fires once per progress notification carrying this
    /// request's token and never after the terminal response.
    pub async fn call_tool_with_progress(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, Value>>,
        progress: ProgressHandler,
    ) -> McpResult<CallToolResult> {
        let params = match arguments {
            Some(arguments) => CallToolParams::with_arguments(name, arguments),
            None => CallToolParams::new(name),
        };
        self.call_method(
            methods::TOOLS_CALL,
            Some(serde_json::to_value(params)?),
            Some(progress),
        )
        .await
    }

    /// List resources, optionally from a pagination cursor.
    pub async fn list_resources(&self, cursor: Option<Cursor>) -> McpResult<ListResourcesResult> {
        let params = ListResourcesParams { cursor, meta: None };
        self.call_method(
            methods::RESOURCES_LIST,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// List resource templates.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> McpResult<ListResourceTemplatesResult> {
        let params = ListResourceTemplatesParams { cursor, meta: None };
        self.call_method(
            methods::RESOURCES_TEMPLATES_LIST,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Read a resource.
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        let params = ReadResourceParams::new(uri.into());
        self.call_method(
            methods::RESOURCES_READ,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Subscribe to updates for a resource.
    pub async fn subscribe_resource(
        &self,
        uri: impl Into<String>,
    ) -> McpResult<SubscribeResourceResult> {
        let params = SubscribeResourceParams {
            uri: uri.into(),
            meta: None,
        };
        self.call_method(
            methods::RESOURCES_SUBSCRIBE,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Unsubscribe from updates for a resource.
    pub async fn unsubscribe_resource(
        &self,
        uri: impl Into<String>,
    ) -> McpResult<UnsubscribeResourceResult> {
        let params = UnsubscribeResourceParams {
            uri: uri.into(),
            meta: None,
        };
        self.call_method(
            methods::RESOURCES_UNSUBSCRIBE,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// List prompts, optionally from a pagination cursor.
    pub async fn list_prompts(&self, cursor: Option<Cursor>) -> McpResult<ListPromptsResult> {
        let params = ListPromptsParams { cursor, meta: None };
        self.call_method(
            methods::PROMPTS_LIST,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Fetch a prompt, optionally with templating arguments.
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        let params = match arguments {
            Some(arguments) => GetPromptParams::with_arguments(name, arguments),
            None => GetPromptParams::new(name),
        };
        self.call_method(
            methods::PROMPTS_GET,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Request completion suggestions for an argument.
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument: CompletionArgument,
    ) -> McpResult<CompleteResult> {
        let params = CompleteParams {
            reference,
            argument,
            meta: None,
        };
        self.call_method(
            methods::COMPLETION_COMPLETE,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    /// Complete a prompt argument and return just the candidate values.
    pub async fn complete_prompt_argument(
        &self,
        prompt_name: &str,
        argument_name: &str,
        current_value: &str,
    ) -> McpResult<Vec<String>> {
        let result = self
            .complete(
                CompletionReference::Prompt {
                    name: prompt_name.to_string(),
                },
                CompletionArgument {
                    name: argument_name.to_string(),
                    value: current_value.to_string(),
                },
            )
            .await?;
        Ok(result.completion.values)
    }

    /// Complete a resource URI template argument.
    pub async fn complete_resource_uri(
        &self,
        uri_template: &str,
        argument_name: &str,
        current_value: &str,
    ) -> McpResult<Vec<String>> {
        let result = self
            .complete(
                CompletionReference::Resource {
                    uri: uri_template.to_string(),
                },
                CompletionArgument {
                    name: argument_name.to_string(),
                    value: current_value.to_string(),
                },
            )
            .await?;
        Ok(result.completion.values)
    }

    /// Complete a tool argument.
    pub async fn complete_tool_argument(
        &self,
        tool_name: &str,
        argument_name: &str,
        current_value: &str,
    ) -> McpResult<Vec<String>> {
        let result = self
            .complete(
                CompletionReference::Tool {
                    name: tool_name.to_string(),
                },
                CompletionArgument {
                    name: argument_name.to_string(),
                    value: current_value.to_string(),
                },
            )
            .await?;
        Ok(result.completion.values)
    }

    /// Set the server's minimum forwarded log level.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<SetLoggingLevelResult> {
        let params = SetLoggingLevelParams { level, meta: None };
        self.call_method(
            methods::LOGGING_SET_LEVEL,
            Some(serde_json::to_value(params)?),
            None,
        )
        .await
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// The roots currently advertised to servers.
    pub fn roots(&self) -> Vec<Root> {
        self.inner
            .roots
            .as_ref()
            .map(|provider| provider.current())
            .unwrap_or_default()
    }

    /// Replace the root set and notify the server when it actually changed.
    ///
    /// Only valid for a static roots provider; dynamic providers update at
    /// their source and use [`Endpoint::notify_roots_changed`].
    pub async fn set_roots(&self, roots: Vec<Root>) -> McpResult<()> {
        let provider = self.inner.roots.as_ref().ok_or_else(|| {
            McpError::invalid_state("roots are not advertised by this client")
        })?;
        match provider {
            RootsProvider::Static(current) => {
                *current.write().unwrap_or_else(|e| e.into_inner()) = roots;
            }
            RootsProvider::Dynamic(_) => {
                return Err(McpError::invalid_state(
                    "roots come from a dynamic callback; update its source instead",
                ));
            }
        }
        self.notify_roots_changed().await
    }

    /// Emit `notifications/roots/list_changed` if the current set differs
    /// from the last-notified set.
    pub async fn notify_roots_changed(&self) -> McpResult<()> {
        let provider = match &self.inner.roots {
            Some(provider) => provider,
            None => return Ok(()),
        };
        let current = provider.current();

        {
            let mut last = self
                .inner
                .last_notified_roots
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if last.as_ref() == Some(&current) {
                return Ok(());
            }
            *last = Some(current);
        }

        if !self.state().is_running() {
            return Ok(());
        }
        self.inner
            .send_notification(methods::ROOTS_LIST_CHANGED, None)
            .await
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("client", &self.inner.config.client_info.name)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Inbound router
// ============================================================================

/// Consume the transport's message stream until it ends, then settle the
/// endpoint into its terminal state.
async fn run_reader(inner: Arc<EndpointInner>, mut messages: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(frame) = messages.recv().await {
        route_frame(&inner, frame).await;
    }

    // Deliberate stop already settled everything
    if inner.state() == EndpointState::Disconnected {
        return;
    }

    let transport_state = {
        let guard = inner.transport.lock().await;
        guard.as_ref().map(|t| t.state())
    };

    match transport_state {
        Some(TransportState::Failed(reason)) => {
            tracing::warn!("transport failed: {reason}");
            inner.fail_all_pending(&McpError::internal(format!("transport failed: {reason}")));
            inner.set_state(EndpointState::Failed(reason));
        }
        _ => {
            tracing::debug!("inbound stream ended, connection closed");
            inner.fail_all_pending(&McpError::ConnectionClosed(
                "connection closed".to_string(),
            ));
            inner.set_state(EndpointState::Disconnected);
        }
    }
}

async fn route_frame(inner: &Arc<EndpointInner>, frame: Vec<u8>) {
    match decode_message(&frame) {
        Ok(IncomingMessage::Notification(notification)) => {
            route_notification(inner, notification);
        }
        Ok(IncomingMessage::Response(response)) => {
            match inner.take_pending(&response.id) {
                Some(record) => {
                    let _ = record.completer.send(Ok(response.result));
                }
                None => {
                    tracing::warn!("response for unknown request id {}", response.id);
                }
            }
        }
        Ok(IncomingMessage::Error(error)) => match inner.take_pending(&error.id) {
            Some(record) => {
                let _ = record.completer.send(Err(McpError::from_error_object(
                    error.error.code,
                    error.error.message,
                )));
            }
            None => {
                tracing::warn!("error response for unknown request id {}", error.id);
            }
        },
        Ok(IncomingMessage::Request(request)) => {
            // Server requests run unbounded, one task each
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                answer_server_request(inner, request).await;
            });
        }
        Err(decode_error) => {
            respond_to_malformed_frame(inner, &frame, decode_error).await;
        }
    }
}

fn route_notification(inner: &Arc<EndpointInner>, notification: JsonRpcNotification) {
    match notification.method.as_str() {
        methods::CANCELLED => {
            let params: CancelledParams = match notification
                .params
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(params)) => params,
                _ => {
                    tracing::warn!("dropping malformed cancelled notification");
                    return;
                }
            };
            if let Some(record) = inner.take_pending(&params.request_id) {
                tracing::debug!(
                    "request {} ({}) cancelled by server: {}",
                    params.request_id,
                    record.method,
                    params.reason.as_deref().unwrap_or("no reason")
                );
                let _ = record.completer.send(Err(McpError::internal("cancelled")));
            }
        }
        methods::PROGRESS => {
            let params: ProgressParams = match notification
                .params
                .map(serde_json::from_value)
                .transpose()
            {
                Ok(Some(params)) => params,
                _ => {
                    tracing::warn!("dropping malformed progress notification");
                    return;
                }
            };
            let handler = {
                let map = inner.progress.lock().unwrap_or_else(|e| e.into_inner());
                map.get(&params.progress_token).cloned()
            };
            // Progress for a finished or unknown request must not block
            // anything; it simply drops here
            if let Some(handler) = handler {
                tokio::spawn(async move {
                    handler(params.progress, params.total);
                });
            }
        }
        method => {
            if !methods::is_known_notification(method) {
                tracing::trace!("forwarding unknown notification: {method}");
            }
            // Nobody listening is fine
            let _ = inner.notifications_tx.send(notification);
        }
    }
}

async fn answer_server_request(inner: Arc<EndpointInner>, request: JsonRpcRequest) {
    let id = request.id.clone();
    let frame = match inner.dispatcher.dispatch(&request).await {
        Ok(result) => serde_json::to_vec(&JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }),
        Err(error) => serde_json::to_vec(&JsonRpcError::new(
            id,
            error.code(),
            error.to_string(),
            None,
        )),
    };
    match frame {
        Ok(bytes) => {
            if let Err(e) = inner.write_frame(&bytes).await {
                tracing::warn!("could not answer server request: {e}");
            }
        }
        Err(e) => tracing::error!("could not encode server request response: {e}"),
    }
}

/// Answer malformed requests with -32700/-32600 where an id is extractable;
/// everything else is dropped.
async fn respond_to_malformed_frame(
    inner: &Arc<EndpointInner>,
    frame: &[u8],
    decode_error: McpError,
) {
    let Ok(value) = serde_json::from_slice::<Value>(frame) else {
        tracing::trace!("dropping non-JSON frame");
        return;
    };
    let id = value
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value::<RequestId>(v).ok());
    let looks_like_request = value.get("method").is_some();

    match (id, looks_like_request) {
        (Some(id), true) => {
            let error = JsonRpcError::new(id, decode_error.code(), decode_error.to_string(), None);
            match serde_json::to_vec(&error) {
                Ok(bytes) => {
                    if let Err(e) = inner.write_frame(&bytes).await {
                        tracing::debug!("could not report malformed request: {e}");
                    }
                }
                Err(e) => tracing::debug!("could not encode malformed-request error: {e}"),
            }
        }
        _ => {
            tracing::debug!("dropping malformed frame: {decode_error}");
        }
    }
}

/// Put the progress token into `params._meta.progressToken`.
fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> McpResult<Value> {
    let mut value = params.unwrap_or_else(|| serde_json::json!({}));
    let object = value.as_object_mut().ok_or_else(|| {
        McpError::InvalidParams("params must be an object to carry a progress token".to_string())
    })?;
    let meta = object
        .entry("_meta")
        .or_insert_with(|| serde_json::json!({}));
    meta.as_object_mut()
        .ok_or_else(|| McpError::InvalidParams("_meta must be an object".to_string()))?
        .insert("progressToken".to_string(), serde_json::to_value(token)?);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_token_is_injected_into_meta() {
        let token = ProgressToken::from(RequestId::Number(5));
        let params = inject_progress_token(Some(serde_json::json!({"name": "t"})), &token).unwrap();
        assert_eq!(params["name"], "t");
        assert_eq!(params["_meta"]["progressToken"], 5);
    }

    #[test]
    fn progress_token_injection_creates_params_when_absent() {
        let token = ProgressToken::from(RequestId::Number(8));
        let params = inject_progress_token(None, &token).unwrap();
        assert_eq!(params["_meta"]["progressToken"], 8);
    }

    #[test]
    fn progress_token_injection_rejects_non_object_params() {
        let token = ProgressToken::from(RequestId::Number(1));
        let result = inject_progress_token(Some(serde_json::json!([1, 2])), &token);
        assert!(matches!(result, Err(McpError::InvalidParams(_))));
    }

    #[test]
    fn request_ids_are_unique_and_monotonic() {
        let endpoint = Endpoint::new(Implementation::new("t", "0"));
        let a = endpoint.inner.next_request_id();
        let b = endpoint.inner.next_request_id();
        assert_ne!(a, b);
        match (a, b) {
            (RequestId::Number(a), RequestId::Number(b)) => assert!(b > a),
            other => panic!("expected numeric ids, got {other:?}"),
        }
    }

    #[test]
    fn capabilities_follow_configuration() {
        let endpoint = Endpoint::new(Implementation::new("t", "0"));
        assert!(endpoint.client_capabilities().roots.is_none());
        assert!(endpoint.client_capabilities().sampling.is_none());

        let with_roots = Endpoint::with_parts(
            EndpointConfig::default(),
            ServerRequestDispatcher::new().with_roots(RootsProvider::fixed(vec![])),
            Some(RootsProvider::fixed(vec![])),
        );
        let roots_cap = with_roots.client_capabilities().roots.as_ref().unwrap();
        assert_eq!(roots_cap.list_changed, Some(true));
    }

    #[tokio::test]
    async fn requests_require_running_state() {
        let endpoint = Endpoint::new(Implementation::new("t", "0"));
        let result = endpoint.ping().await;
        match result {
            Err(McpError::Internal(reason)) => assert!(reason.contains("not running")),
            other => panic!("expected not-running error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let endpoint = Endpoint::new(Implementation::new("t", "0"));
        endpoint.stop().await.unwrap();
        assert_eq!(endpoint.state(), EndpointState::Disconnected);
    }
}
