//! Transport layer traits and shared configuration.
//!
//! A transport is a byte-stream carrier: it moves opaque frames between the
//! client and one server. Correlation, typing, and routing all live above it
//! in the endpoint. Concrete implementations are the stdio transport (child
//! process) and the SSE transport (HTTP GET downchannel + POST upchannel).

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::core::error::{McpError, McpResult};
use crate::core::retry::RetryPolicy;

/// Observable connection state of a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportState {
    /// Not connected
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Connected and ready to carry frames
    Connected,
    /// Unrecoverable failure
    Failed(String),
}

/// Transport configuration options.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Cap on connection establishment and the initialize handshake
    pub connect_timeout: Duration,
    /// Default per-send deadline
    pub send_timeout: Duration,
    /// Largest frame the transport will accept for sending
    pub max_message_size: usize,
    /// Extra headers for HTTP-based transports (bearer/cookie pass-through)
    pub headers: HashMap<String, String>,
    /// Retry policy for operations that opt into retrying
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            max_message_size: 4 * 1024 * 1024, // 4 MiB
            headers: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A byte-stream carrier for MCP frames.
///
/// Implementations are message-serial: one mutating call runs at a time per
/// instance, and concurrent `send`s never interleave bytes within a frame.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport.
    ///
    /// Calling `start` while already connected is a no-op, not an error.
    async fn start(&mut self) -> McpResult<()>;

    /// Stop the transport and end the inbound message stream. Idempotent.
    async fn stop(&mut self) -> McpResult<()>;

    /// Send one frame, bounded by `timeout` or the configured send timeout.
    ///
    /// Fails with [`McpError::InvalidState`] when not connected and with
    /// [`McpError::MessageTooLarge`] before any bytes touch the wire when the
    /// frame exceeds the configured maximum.
    async fn send(&mut self, data: &[u8], timeout: Option<Duration>) -> McpResult<()>;

    /// Subscribe to inbound frames.
    ///
    /// Each call yields a fresh stream; the stream ends when the transport
    /// stops or hits an unrecoverable error. Subscribing may start the
    /// underlying connection on transports that connect lazily.
    fn messages(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>>;

    /// Current connection state.
    fn state(&self) -> TransportState;

    /// Watch for state changes.
    fn state_changes(&self) -> watch::Receiver<TransportState>;

    /// Human-readable description of the connection for logs.
    fn connection_info(&self) -> String {
        "unknown transport".to_string()
    }
}

/// Reject frames larger than the configured maximum before sending.
pub(crate) fn check_frame_size(data: &[u8], config: &TransportConfig) -> McpResult<()> {
    if data.len() > config.max_message_size {
        return Err(McpError::MessageTooLarge(data.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.send_timeout, Duration::from_secs(30));
        assert_eq!(config.max_message_size, 4 * 1024 * 1024);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn state_equality() {
        assert_eq!(TransportState::Connected, TransportState::Connected);
        assert_ne!(TransportState::Connected, TransportState::Disconnected);
        assert_eq!(
            TransportState::Failed("x".into()),
            TransportState::Failed("x".into())
        );
        assert_ne!(
            TransportState::Failed("x".into()),
            TransportState::Failed("y".into())
        );
    }

    #[test]
    fn frame_size_check() {
        let config = TransportConfig {
            max_message_size: 10,
            ..Default::default()
        };
        assert!(check_frame_size(&[0u8; 10], &config).is_ok());
        match check_frame_size(&[0u8; 11], &config) {
            Err(McpError::MessageTooLarge(size)) => assert_eq!(size, 11),
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
    }
}
