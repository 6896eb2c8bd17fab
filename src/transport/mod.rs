//! Transport layer: byte-stream carriers for MCP frames.
//!
//! The [`traits::Transport`] contract is implemented by the STDIO transport
//! (child process, newline-framed) and the SSE transport (HTTP GET event
//! stream + POST upchannel).

pub mod traits;

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "sse")]
pub mod sse;

pub use traits::{Transport, TransportConfig, TransportState};

#[cfg(feature = "stdio")]
pub use stdio::StdioTransport;

#[cfg(feature = "sse")]
pub use sse::SseTransport;
