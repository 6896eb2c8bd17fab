//! Handling for server-initiated requests.
//!
//! MCP is bidirectional: once a connection is running, the server may send
//! its own requests to the client. The dispatcher built here answers the
//! three methods a client is expected to serve: `ping`, `roots/list` when
//! the client advertises roots, and `sampling/createMessage` when a sampling
//! handler is configured. Everything else gets a MethodNotFound response.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::{
    CreateMessageParams, CreateMessageResult, ListRootsResult, PingResult,
};
use crate::protocol::methods;
use crate::protocol::types::{JsonRpcRequest, Root};

/// Handler for server-requested LLM sampling.
///
/// The endpoint calls this when the server sends `sampling/createMessage`.
/// A failure becomes an error response on the wire.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Run a completion on the server's behalf.
    async fn create_message(&self, params: CreateMessageParams) -> McpResult<CreateMessageResult>;
}

/// Where the client's roots come from.
#[derive(Clone)]
pub enum RootsProvider {
    /// A fixed list, replaceable at runtime
    Static(Arc<std::sync::RwLock<Vec<Root>>>),
    /// Recomputed on every roots/list request
    Dynamic(Arc<dyn Fn() -> Vec<Root> + Send + Sync>),
}

impl RootsProvider {
    /// Build a static provider from a list of roots.
    pub fn fixed(roots: Vec<Root>) -> Self {
        RootsProvider::Static(Arc::new(std::sync::RwLock::new(roots)))
    }

    /// Build a dynamic provider from a callback.
    pub fn dynamic<F>(callback: F) -> Self
    where
        F: Fn() -> Vec<Root> + Send + Sync + 'static,
    {
        RootsProvider::Dynamic(Arc::new(callback))
    }

    /// The current root set.
    pub fn current(&self) -> Vec<Root> {
        match self {
            RootsProvider::Static(roots) => {
                roots.read().unwrap_or_else(|e| e.into_inner()).clone()
            }
            RootsProvider::Dynamic(callback) => callback(),
        }
    }

    /// Replace the root set. Converts a dynamic provider into a static one.
    pub fn replace(&mut self, roots: Vec<Root>) {
        match self {
            RootsProvider::Static(current) => {
                *current.write().unwrap_or_else(|e| e.into_inner()) = roots;
            }
            RootsProvider::Dynamic(_) => {
                *self = RootsProvider::fixed(roots);
            }
        }
    }
}

impl std::fmt::Debug for RootsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootsProvider::Static(roots) => f
                .debug_tuple("Static")
                .field(&roots.read().unwrap_or_else(|e| e.into_inner()).len())
                .finish(),
            RootsProvider::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// Dispatcher answering requests the server sends to the client.
#[derive(Clone, Default)]
pub struct ServerRequestDispatcher {
    roots: Option<RootsProvider>,
    sampling: Option<Arc<dyn SamplingHandler>>,
}

impl ServerRequestDispatcher {
    /// Dispatcher that answers ping and rejects everything else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve roots/list from the given provider.
    pub fn with_roots(mut self, roots: RootsProvider) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Delegate sampling/createMessage to the given handler.
    pub fn with_sampling(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    /// Whether a roots provider is configured.
    pub fn has_roots(&self) -> bool {
        self.roots.is_some()
    }

    /// Whether a sampling handler is configured.
    pub fn has_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// The configured roots provider, if any.
    pub fn roots(&self) -> Option<&RootsProvider> {
        self.roots.as_ref()
    }

    /// Mutable access to the roots provider for runtime replacement.
    pub fn roots_mut(&mut self) -> Option<&mut RootsProvider> {
        self.roots.as_mut()
    }

    /// Answer one server request with the typed result value.
    ///
    /// Errors returned here are turned into JSON-RPC error responses by the
    /// endpoint's router.
    pub async fn dispatch(&self, request: &JsonRpcRequest) -> McpResult<serde_json::Value> {
        match request.method.as_str() {
            methods::PING => {
                let result = PingResult::default();
                Ok(serde_json::to_value(result)?)
            }
            methods::ROOTS_LIST => {
                let provider = self.roots.as_ref().ok_or_else(|| {
                    McpError::MethodNotFound("roots are not advertised by this client".to_string())
                })?;
                let result = ListRootsResult {
                    roots: provider.current(),
                    meta: None,
                };
                Ok(serde_json::to_value(result)?)
            }
            methods::SAMPLING_CREATE_MESSAGE => {
                let handler = self.sampling.as_ref().ok_or_else(|| {
                    McpError::MethodNotFound(
                        "sampling is not advertised by this client".to_string(),
                    )
                })?;
                let params: CreateMessageParams = serde_json::from_value(
                    request
                        .params
                        .clone()
                        .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?,
                )
                .map_err(|e| McpError::InvalidParams(e.to_string()))?;
                let result = handler.create_message(params).await?;
                Ok(serde_json::to_value(result)?)
            }
            other => Err(McpError::MethodNotFound(format!(
                "unknown method: {other}"
            ))),
        }
    }
}

impl std::fmt::Debug for ServerRequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRequestDispatcher")
            .field("roots", &self.roots)
            .field("sampling", &self.sampling.is_some())
            .finish()
    }
}
