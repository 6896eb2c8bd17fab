//! Error types for the harbor-mcp stack.
//!
//! One crate-level error enum covers both layers of the system: transport
//! failures (connection, framing, deadlines) and protocol failures (JSON-RPC
//! error classes plus the MCP extensions for closed connections and request
//! timeouts).

use thiserror::Error;

/// The main error type for the crate.
#[derive(Error, Debug, Clone)]
pub enum McpError {
    // ------------------------------------------------------------------
    // Transport errors
    // ------------------------------------------------------------------
    /// An operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A frame could not be understood at the transport level
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Establishing or keeping the connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A retried operation exhausted its attempts
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The transport or endpoint was in the wrong state for the call
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An outbound frame exceeded the configured maximum size
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// The requested feature is unavailable on this platform or build
    #[error("Not supported: {0}")]
    NotSupported(String),

    // ------------------------------------------------------------------
    // Protocol errors
    // ------------------------------------------------------------------
    /// Invalid JSON was received (-32700)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The envelope was not a valid JSON-RPC object (-32600)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The method does not exist or is not available (-32601)
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid method parameters (-32602)
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Internal error (-32603)
    #[error("Internal error: {0}")]
    Internal(String),

    /// A server-defined error outside the standard ranges
    #[error("Server error {code}: {message}")]
    ServerError {
        /// Numeric code from the error response
        code: i32,
        /// Message from the error response
        message: String,
    },

    /// The connection closed while requests were outstanding (-1)
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// A request's deadline elapsed before its response arrived (-2)
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    // ------------------------------------------------------------------
    // Wrapped library errors
    // ------------------------------------------------------------------
    /// JSON serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An underlying I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),

    /// URL parsing failed
    #[error("URL error: {0}")]
    Url(String),

    /// HTTP-level failure on the SSE transport
    #[cfg(feature = "sse")]
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for harbor-mcp operations.
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create an invalid-state error.
    pub fn invalid_state<S: Into<String>>(reason: S) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Create a connection-failed error.
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create an invalid-request error.
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// The JSON-RPC error code this error maps to when sent on the wire.
    pub fn code(&self) -> i32 {
        use crate::protocol::types::error_codes;
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            McpError::ConnectionClosed(_) => error_codes::CONNECTION_CLOSED,
            McpError::RequestTimeout(_) => error_codes::REQUEST_TIMEOUT,
            McpError::ServerError { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Build the error for a JSON-RPC error response received from the peer.
    pub fn from_error_object(code: i32, message: String) -> Self {
        use crate::protocol::types::error_codes;
        match code {
            error_codes::PARSE_ERROR => McpError::ParseError(message),
            error_codes::INVALID_REQUEST => McpError::InvalidRequest(message),
            error_codes::METHOD_NOT_FOUND => McpError::MethodNotFound(message),
            error_codes::INVALID_PARAMS => McpError::InvalidParams(message),
            error_codes::INTERNAL_ERROR => McpError::Internal(message),
            error_codes::CONNECTION_CLOSED => McpError::ConnectionClosed(message),
            error_codes::REQUEST_TIMEOUT => McpError::RequestTimeout(message),
            code => McpError::ServerError { code, message },
        }
    }

    /// Whether retrying the failed operation could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            McpError::Timeout(_)
            | McpError::ConnectionFailed(_)
            | McpError::ConnectionClosed(_)
            | McpError::RequestTimeout(_)
            | McpError::Io(_) => true,
            #[cfg(feature = "sse")]
            McpError::Http(_) => true,
            _ => false,
        }
    }

    /// Coarse error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Timeout(_) | McpError::RequestTimeout(_) => "timeout",
            McpError::InvalidMessage(_) | McpError::ParseError(_) => "decode",
            McpError::ConnectionFailed(_) | McpError::ConnectionClosed(_) => "connection",
            McpError::OperationFailed(_) => "retry",
            McpError::InvalidState(_) => "state",
            McpError::MessageTooLarge(_) => "framing",
            McpError::NotSupported(_) => "platform",
            McpError::InvalidRequest(_) | McpError::InvalidParams(_) => "validation",
            McpError::MethodNotFound(_) => "not_found",
            McpError::Internal(_) => "internal",
            McpError::ServerError { .. } => "server",
            McpError::Serialization(_) => "serialization",
            McpError::Io(_) => "io",
            McpError::Url(_) => "url",
            #[cfg(feature = "sse")]
            McpError::Http(_) => "http",
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Url(err.to_string())
    }
}

#[cfg(feature = "sse")]
impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        McpError::Http(err.to_string())
    }
}
