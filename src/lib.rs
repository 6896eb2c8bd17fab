//! # harbor-mcp
//!
//! A client-side [Model Context Protocol](https://modelcontextprotocol.io/)
//! stack: a typed JSON-RPC 2.0 endpoint over pluggable byte-stream
//! transports, plus a host that aggregates any number of named connections.
//!
//! ## What's inside
//!
//! - **Endpoint**: request/response correlation over one connection, with
//!   the initialize handshake, capability gating, progress routing,
//!   cancellation, and dispatch of server-initiated requests.
//! - **Transports**: STDIO (child process, newline-framed JSON) and SSE
//!   (HTTP GET event stream down, HTTP POST up with server-advertised
//!   endpoint discovery).
//! - **Host**: a named set of endpoints with notification-driven caches of
//!   each server's tools, resources, and prompts, plus health queries.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use harbor_mcp::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let endpoint = EndpointBuilder::new("my-host", "1.0.0")
//!         .root(Root::new("file:///workspace").with_name("Workspace"))
//!         .build();
//!
//!     let transport = StdioTransport::new("my-mcp-server", vec!["--stdio"]);
//!     let init = endpoint.start(transport).await?;
//!     println!("connected to {} v{}", init.server_info.name, init.server_info.version);
//!
//!     let tools = endpoint.list_tools(None).await?;
//!     for tool in tools.tools {
//!         println!("- {}", tool.name);
//!     }
//!
//!     endpoint.stop().await
//! }
//! ```
//!
//! ## Module organization
//!
//! - [`protocol`]: message model, method registry, envelope codec
//! - [`transport`]: the transport contract and its STDIO and SSE implementations
//! - [`client`]: the endpoint state machine and its builder
//! - [`host`]: the multi-connection aggregator
//! - [`core`]: errors, logging, retry/timeout primitives
//! - [`utils`]: URL helpers

pub mod client;
pub mod core;
pub mod host;
pub mod protocol;
pub mod transport;
pub mod utils;

// Re-export the types nearly every consumer needs
pub use crate::core::error::{McpError, McpResult};
pub use crate::protocol::types::{RequestId, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};

/// Convenient imports for typical usage.
pub mod prelude {
    pub use crate::client::{
        Endpoint, EndpointBuilder, EndpointState, ProgressHandler, RootsProvider, SamplingHandler,
    };
    pub use crate::core::error::{McpError, McpResult};
    pub use crate::core::retry::{with_retry, with_timeout, Backoff, RetryPolicy};
    pub use crate::host::{HostConfig, McpHost};
    pub use crate::protocol::messages::*;
    pub use crate::protocol::types::*;
    pub use crate::transport::{Transport, TransportConfig, TransportState};

    #[cfg(feature = "stdio")]
    pub use crate::transport::StdioTransport;

    #[cfg(feature = "sse")]
    pub use crate::transport::SseTransport;

    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use std::collections::HashMap;
}
