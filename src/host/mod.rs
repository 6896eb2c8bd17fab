//! Host aggregator: a named set of MCP connections.
//!
//! The host owns one endpoint per named server, keeps cached views of each
//! server's tools, resources, and prompts, refreshes those caches when the
//! server announces a change, and answers health and aggregation queries
//! across the whole set. Caches mirror the last server listing; they are
//! views, not ground truth.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::client::endpoint::{Endpoint, EndpointState};
use crate::client::request_handler::SamplingHandler;
use crate::client::EndpointBuilder;
use crate::core::error::{McpError, McpResult};
use crate::protocol::methods::{self, CapabilityKind};
use crate::protocol::types::{
    Implementation, Prompt, Resource, Root, ServerCapabilities, Tool,
};
use crate::transport::traits::Transport;

/// Configuration shared by every connection the host opens.
#[derive(Clone)]
pub struct HostConfig {
    /// Client identity presented to every server
    pub client_info: Implementation,
    /// Roots advertised to servers, if any
    pub roots: Option<Vec<Root>>,
    /// Sampling handler registered on every connection, if any
    pub sampling: Option<Arc<dyn SamplingHandler>>,
    /// Cap on each connection's initialize handshake
    pub connect_timeout: Duration,
    /// Per-request deadline on each connection
    pub request_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("harbor-mcp-host", env!("CARGO_PKG_VERSION")),
            roots: None,
            sampling: None,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("client_info", &self.client_info)
            .field("roots", &self.roots)
            .field("sampling", &self.sampling.is_some())
            .finish()
    }
}

struct RefreshFlags {
    tools: AtomicBool,
    resources: AtomicBool,
    prompts: AtomicBool,
}

impl RefreshFlags {
    fn new() -> Self {
        Self {
            tools: AtomicBool::new(false),
            resources: AtomicBool::new(false),
            prompts: AtomicBool::new(false),
        }
    }
}

struct Connection {
    name: String,
    endpoint: Endpoint,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    tools: std::sync::RwLock<Vec<Tool>>,
    resources: std::sync::RwLock<Vec<Resource>>,
    prompts: std::sync::RwLock<Vec<Prompt>>,
    last_activity: std::sync::RwLock<Instant>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
    refreshing: RefreshFlags,
}

impl Connection {
    fn touch(&self) {
        *self
            .last_activity
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

/// A tool paired with the connection that provides it.
#[derive(Debug, Clone)]
pub struct HostTool {
    /// Name of the connection
    pub connection: String,
    /// The tool definition
    pub tool: Tool,
}

/// A resource paired with the connection that provides it.
#[derive(Debug, Clone)]
pub struct HostResource {
    /// Name of the connection
    pub connection: String,
    /// The resource definition
    pub resource: Resource,
}

/// A prompt paired with the connection that provides it.
#[derive(Debug, Clone)]
pub struct HostPrompt {
    /// Name of the connection
    pub connection: String,
    /// The prompt definition
    pub prompt: Prompt,
}

/// Aggregates any number of named MCP connections.
pub struct McpHost {
    config: HostConfig,
    connections: tokio::sync::RwLock<HashMap<String, Arc<Connection>>>,
}

impl McpHost {
    /// Create a host with the given per-connection configuration.
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            connections: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Create a host with defaults.
    pub fn with_defaults() -> Self {
        Self::new(HostConfig::default())
    }

    fn build_endpoint(&self) -> Endpoint {
        let mut builder = EndpointBuilder::new(
            self.config.client_info.name.clone(),
            self.config.client_info.version.clone(),
        )
        .connect_timeout(self.config.connect_timeout)
        .request_timeout(self.config.request_timeout);
        if let Some(title) = &self.config.client_info.title {
            builder = builder.title(title.clone());
        }
        if let Some(roots) = &self.config.roots {
            builder = builder.roots(roots.clone());
        }
        if let Some(sampling) = &self.config.sampling {
            builder = builder.sampling(Arc::clone(sampling));
        }
        builder.build()
    }

    // ========================================================================
    // Connection management
    // ========================================================================

    /// Open a named connection over the given transport.
    ///
    /// Runs the handshake, snapshots the server's identity and capabilities,
    /// primes the caches, and starts a listener that refreshes them on
    /// change notifications.
    pub async fn connect<T: Transport + 'static>(
        &self,
        name: impl Into<String>,
        transport: T,
    ) -> McpResult<()> {
        let name = name.into();
        {
            let connections = self.connections.read().await;
            if connections.contains_key(&name) {
                return Err(McpError::invalid_state(format!(
                    "connection '{name}' already exists"
                )));
            }
        }

        let endpoint = self.build_endpoint();
        let init = endpoint.start(transport).await?;
        tracing::info!(
            "connection '{name}' established to {} v{}",
            init.server_info.name,
            init.server_info.version
        );

        let connection = Arc::new(Connection {
            name: name.clone(),
            endpoint,
            server_info: init.server_info,
            capabilities: init.capabilities,
            tools: std::sync::RwLock::new(Vec::new()),
            resources: std::sync::RwLock::new(Vec::new()),
            prompts: std::sync::RwLock::new(Vec::new()),
            last_activity: std::sync::RwLock::new(Instant::now()),
            listener: std::sync::Mutex::new(None),
            refreshing: RefreshFlags::new(),
        });

        // Prime the caches; failures are logged, not fatal
        refresh_tools(&connection).await;
        refresh_resources(&connection).await;
        refresh_prompts(&connection).await;

        let listener = tokio::spawn(listen_for_changes(Arc::clone(&connection)));
        {
            let mut guard = connection.listener.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(listener);
        }

        self.connections.write().await.insert(name, connection);
        Ok(())
    }

    /// Close a named connection and forget it.
    pub async fn disconnect(&self, name: &str) -> McpResult<()> {
        let connection = {
            let mut connections = self.connections.write().await;
            connections.remove(name).ok_or_else(|| {
                McpError::invalid_state(format!("no connection named '{name}'"))
            })?
        };
        let listener = {
            let mut guard = connection.listener.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(listener) = listener {
            listener.abort();
        }
        connection.endpoint.stop().await?;
        tracing::info!("connection '{name}' closed");
        Ok(())
    }

    /// Close every connection.
    pub async fn shutdown(&self) {
        let names: Vec<String> = {
            let connections = self.connections.read().await;
            connections.keys().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.disconnect(&name).await {
                tracing::warn!("error closing connection '{name}': {e}");
            }
        }
    }

    /// Names of all current connections.
    pub async fn connection_names(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut names: Vec<String> = connections.keys().cloned().collect();
        names.sort();
        names
    }

    /// The endpoint behind a named connection, for direct operations.
    pub async fn endpoint(&self, name: &str) -> Option<Endpoint> {
        let connections = self.connections.read().await;
        connections.get(name).map(|c| c.endpoint.clone())
    }

    /// Server identity reported by a named connection.
    pub async fn server_info(&self, name: &str) -> Option<Implementation> {
        let connections = self.connections.read().await;
        connections.get(name).map(|c| c.server_info.clone())
    }

    /// Capabilities negotiated on a named connection.
    pub async fn server_capabilities(&self, name: &str) -> Option<ServerCapabilities> {
        let connections = self.connections.read().await;
        connections.get(name).map(|c| c.capabilities.clone())
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Tools across all connections, deduplicated by (connection, name).
    pub async fn available_tools(&self) -> Vec<HostTool> {
        let connections = self.connections.read().await;
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for connection in connections.values() {
            let tools = connection.tools.read().unwrap_or_else(|e| e.into_inner());
            for tool in tools.iter() {
                if seen.insert((connection.name.clone(), tool.name.clone())) {
                    all.push(HostTool {
                        connection: connection.name.clone(),
                        tool: tool.clone(),
                    });
                }
            }
        }
        all
    }

    /// Resources across all connections.
    pub async fn available_resources(&self) -> Vec<HostResource> {
        let connections = self.connections.read().await;
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for connection in connections.values() {
            let resources = connection
                .resources
                .read()
                .unwrap_or_else(|e| e.into_inner());
            for resource in resources.iter() {
                if seen.insert((connection.name.clone(), resource.uri.clone())) {
                    all.push(HostResource {
                        connection: connection.name.clone(),
                        resource: resource.clone(),
                    });
                }
            }
        }
        all
    }

    /// Prompts across all connections.
    pub async fn available_prompts(&self) -> Vec<HostPrompt> {
        let connections = self.connections.read().await;
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for connection in connections.values() {
            let prompts = connection.prompts.read().unwrap_or_else(|e| e.into_inner());
            for prompt in prompts.iter() {
                if seen.insert((connection.name.clone(), prompt.name.clone())) {
                    all.push(HostPrompt {
                        connection: connection.name.clone(),
                        prompt: prompt.clone(),
                    });
                }
            }
        }
        all
    }

    /// The cached tool list of one connection.
    pub async fn tools(&self, name: &str) -> Vec<Tool> {
        let connections = self.connections.read().await;
        connections
            .get(name)
            .map(|c| c.tools.read().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Call a tool on a named connection, updating its activity clock.
    pub async fn call_tool(
        &self,
        name: &str,
        tool: impl Into<String>,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> McpResult<crate::protocol::types::CallToolResult> {
        let connection = self.get(name).await?;
        let result = connection.endpoint.call_tool(tool, arguments).await?;
        connection.touch();
        Ok(result)
    }

    /// Read a resource on a named connection, updating its activity clock.
    pub async fn read_resource(
        &self,
        name: &str,
        uri: impl Into<String>,
    ) -> McpResult<crate::protocol::messages::ReadResourceResult> {
        let connection = self.get(name).await?;
        let result = connection.endpoint.read_resource(uri).await?;
        connection.touch();
        Ok(result)
    }

    /// Fetch a prompt on a named connection, updating its activity clock.
    pub async fn get_prompt(
        &self,
        name: &str,
        prompt: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<crate::protocol::messages::GetPromptResult> {
        let connection = self.get(name).await?;
        let result = connection.endpoint.get_prompt(prompt, arguments).await?;
        connection.touch();
        Ok(result)
    }

    /// Re-fetch the tool cache of one connection.
    pub async fn refresh_tools(&self, name: &str) -> McpResult<()> {
        let connection = self.get(name).await?;
        refresh_tools(&connection).await;
        Ok(())
    }

    /// Re-fetch the resource cache of one connection.
    pub async fn refresh_resources(&self, name: &str) -> McpResult<()> {
        let connection = self.get(name).await?;
        refresh_resources(&connection).await;
        Ok(())
    }

    /// Re-fetch the prompt cache of one connection.
    pub async fn refresh_prompts(&self, name: &str) -> McpResult<()> {
        let connection = self.get(name).await?;
        refresh_prompts(&connection).await;
        Ok(())
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Connections with no successful activity for longer than `timeout`.
    pub async fn inactive_connections(&self, timeout: Duration) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut names: Vec<String> = connections
            .values()
            .filter(|c| c.idle_for() > timeout)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Connections whose endpoint has failed.
    pub async fn failed_connections(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut names: Vec<String> = connections
            .values()
            .filter(|c| matches!(c.endpoint.state(), EndpointState::Failed(_)))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Connections whose server advertises the given capability.
    pub async fn connections_supporting(&self, feature: CapabilityKind) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut names: Vec<String> = connections
            .values()
            .filter(|c| feature.advertised_by(&c.capabilities))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Lifecycle state of a named connection.
    pub async fn connection_state(&self, name: &str) -> Option<EndpointState> {
        let connections = self.connections.read().await;
        connections.get(name).map(|c| c.endpoint.state())
    }

    async fn get(&self, name: &str) -> McpResult<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::invalid_state(format!("no connection named '{name}'")))
    }
}

/// React to change notifications by refreshing the matching cache.
async fn listen_for_changes(connection: Arc<Connection>) {
    let mut notifications = connection.endpoint.notifications();
    loop {
        match notifications.recv().await {
            Ok(notification) => match notification.method.as_str() {
                methods::TOOLS_LIST_CHANGED => refresh_tools(&connection).await,
                methods::RESOURCES_LIST_CHANGED | methods::RESOURCES_UPDATED => {
                    refresh_resources(&connection).await
                }
                methods::PROMPTS_LIST_CHANGED => refresh_prompts(&connection).await,
                _ => {}
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                // Missed notifications; refresh everything to resync
                tracing::warn!(
                    "listener for '{}' lagged by {skipped} notifications",
                    connection.name
                );
                refresh_tools(&connection).await;
                refresh_resources(&connection).await;
                refresh_prompts(&connection).await;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Refresh one connection's tool cache. Skips when the server lacks the
/// capability, the connection is down, or a refresh is already in flight.
async fn refresh_tools(connection: &Arc<Connection>) {
    if !CapabilityKind::Tools.advertised_by(&connection.capabilities)
        || !connection.endpoint.state().is_running()
    {
        return;
    }
    if connection.refreshing.tools.swap(true, Ordering::SeqCst) {
        return;
    }

    let mut collected = Vec::new();
    let mut cursor = None;
    let result = loop {
        match connection.endpoint.list_tools(cursor.clone()).await {
            Ok(page) => {
                collected.extend(page.tools);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break Ok(()),
                }
            }
            Err(e) => break Err(e),
        }
    };
    connection.refreshing.tools.store(false, Ordering::SeqCst);

    match result {
        Ok(()) => {
            tracing::debug!(
                "'{}' tools refreshed ({} entries)",
                connection.name,
                collected.len()
            );
            *connection.tools.write().unwrap_or_else(|e| e.into_inner()) = collected;
            connection.touch();
        }
        Err(e) => tracing::warn!("tool refresh for '{}' failed: {e}", connection.name),
    }
}

/// Refresh one connection's resource cache; same gating as tools.
async fn refresh_resources(connection: &Arc<Connection>) {
    if !CapabilityKind::Resources.advertised_by(&connection.capabilities)
        || !connection.endpoint.state().is_running()
    {
        return;
    }
    if connection.refreshing.resources.swap(true, Ordering::SeqCst) {
        return;
    }

    let mut collected = Vec::new();
    let mut cursor = None;
    let result = loop {
        match connection.endpoint.list_resources(cursor.clone()).await {
            Ok(page) => {
                collected.extend(page.resources);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break Ok(()),
                }
            }
            Err(e) => break Err(e),
        }
    };
    connection.refreshing.resources.store(false, Ordering::SeqCst);

    match result {
        Ok(()) => {
            *connection
                .resources
                .write()
                .unwrap_or_else(|e| e.into_inner()) = collected;
            connection.touch();
        }
        Err(e) => tracing::warn!("resource refresh for '{}' failed: {e}", connection.name),
    }
}

/// Refresh one connection's prompt cache; same gating as tools.
async fn refresh_prompts(connection: &Arc<Connection>) {
    if !CapabilityKind::Prompts.advertised_by(&connection.capabilities)
        || !connection.endpoint.state().is_running()
    {
        return;
    }
    if connection.refreshing.prompts.swap(true, Ordering::SeqCst) {
        return;
    }

    let mut collected = Vec::new();
    let mut cursor = None;
    let result = loop {
        match connection.endpoint.list_prompts(cursor.clone()).await {
            Ok(page) => {
                collected.extend(page.prompts);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break Ok(()),
                }
            }
            Err(e) => break Err(e),
        }
    };
    connection.refreshing.prompts.store(false, Ordering::SeqCst);

    match result {
        Ok(()) => {
            *connection.prompts.write().unwrap_or_else(|e| e.into_inner()) = collected;
            connection.touch();
        }
        Err(e) => tracing::warn!("prompt refresh for '{}' failed: {e}", connection.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_host_has_no_connections() {
        let host = McpHost::with_defaults();
        assert!(host.connection_names().await.is_empty());
        assert!(host.available_tools().await.is_empty());
        assert!(host.failed_connections().await.is_empty());
        assert!(host
            .inactive_connections(Duration::from_secs(1))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn disconnect_unknown_name_is_an_error() {
        let host = McpHost::with_defaults();
        let result = host.disconnect("nope").await;
        assert!(matches!(result, Err(McpError::InvalidState(_))));
    }

    #[tokio::test]
    async fn endpoint_lookup_misses_return_none() {
        let host = McpHost::with_defaults();
        assert!(host.endpoint("missing").await.is_none());
        assert!(host.server_info("missing").await.is_none());
        assert!(host.connection_state("missing").await.is_none());
    }

    #[test]
    fn host_config_debug_does_not_require_handler_debug() {
        let config = HostConfig::default();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("harbor-mcp-host"));
    }
}
