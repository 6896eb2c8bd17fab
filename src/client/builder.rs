//! Builder for configuring an [`Endpoint`].

use std::sync::Arc;
use std::time::Duration;

use crate::client::endpoint::{Endpoint, EndpointConfig};
use crate::client::request_handler::{RootsProvider, SamplingHandler, ServerRequestDispatcher};
use crate::protocol::types::{Implementation, Root, SUPPORTED_PROTOCOL_VERSIONS};

/// Assembles an [`Endpoint`] from client identity, handlers, and timeouts.
///
/// Capabilities are derived from configuration: providing roots advertises
/// the roots capability with change notifications, providing a sampling
/// handler advertises sampling.
///
/// ```
/// use harbor_mcp::client::EndpointBuilder;
/// use harbor_mcp::protocol::types::Root;
///
/// let endpoint = EndpointBuilder::new("my-host", "1.0.0")
///     .root(Root::new("file:///workspace").with_name("Workspace"))
///     .build();
/// assert!(endpoint.client_capabilities().roots.is_some());
/// ```
pub struct EndpointBuilder {
    name: String,
    version: String,
    title: Option<String>,
    roots: Option<RootsProvider>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    connect_timeout: Duration,
    request_timeout: Duration,
    protocol_versions: Vec<String>,
}

impl EndpointBuilder {
    /// Start building an endpoint for the given client identity.
    pub fn new<S: Into<String>>(name: S, version: S) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
            roots: None,
            sampling: None,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }

    /// Human-readable client title.
    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add one root to a static root set.
    pub fn root(mut self, root: Root) -> Self {
        match &mut self.roots {
            Some(RootsProvider::Static(current)) => {
                current.write().unwrap_or_else(|e| e.into_inner()).push(root);
            }
            _ => {
                self.roots = Some(RootsProvider::fixed(vec![root]));
            }
        }
        self
    }

    /// Advertise a static root set.
    pub fn roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = Some(RootsProvider::fixed(roots));
        self
    }

    /// Advertise roots computed by a callback on every roots/list request.
    pub fn dynamic_roots<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Vec<Root> + Send + Sync + 'static,
    {
        self.roots = Some(RootsProvider::dynamic(callback));
        self
    }

    /// Handle server sampling requests with the given handler.
    pub fn sampling(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    /// Cap on the initialize handshake. Default 30 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Per-request deadline. Default 30 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Restrict the protocol versions accepted from servers.
    pub fn protocol_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocol_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Build the endpoint.
    pub fn build(self) -> Endpoint {
        let mut client_info = Implementation::new(self.name, self.version);
        if let Some(title) = self.title {
            client_info = client_info.with_title(title);
        }

        let mut dispatcher = ServerRequestDispatcher::new();
        if let Some(roots) = &self.roots {
            dispatcher = dispatcher.with_roots(roots.clone());
        }
        if let Some(sampling) = &self.sampling {
            dispatcher = dispatcher.with_sampling(Arc::clone(sampling));
        }

        let config = EndpointConfig {
            client_info,
            protocol_versions: self.protocol_versions,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        };

        Endpoint::with_parts(config, dispatcher, self.roots)
    }
}

impl std::fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("roots", &self.roots)
            .field("sampling", &self.sampling.is_some())
            .finish()
    }
}
