//! Structured error logging.
//!
//! Errors are logged through `tracing` with a severity derived from the error
//! class and a context record describing where the failure happened.

use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::core::error::McpError;

/// Log level for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Errors that break functionality
    Error,
    /// Recoverable trouble worth surfacing
    Warning,
    /// Client-side input or validation issues
    Info,
}

impl From<&McpError> for ErrorLogLevel {
    fn from(error: &McpError) -> Self {
        match error {
            McpError::Internal(_)
            | McpError::InvalidMessage(_)
            | McpError::ParseError(_)
            | McpError::Serialization(_)
            | McpError::NotSupported(_) => ErrorLogLevel::Error,

            McpError::Timeout(_)
            | McpError::RequestTimeout(_)
            | McpError::ConnectionFailed(_)
            | McpError::ConnectionClosed(_)
            | McpError::OperationFailed(_)
            | McpError::Io(_)
            | McpError::ServerError { .. } => ErrorLogLevel::Warning,

            McpError::InvalidState(_)
            | McpError::MessageTooLarge(_)
            | McpError::InvalidRequest(_)
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_)
            | McpError::Url(_) => ErrorLogLevel::Info,

            #[cfg(feature = "sse")]
            McpError::Http(_) => ErrorLogLevel::Warning,
        }
    }
}

/// Context describing where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation being performed when the error occurred
    pub operation: String,
    /// Transport kind (stdio, sse)
    pub transport: Option<String>,
    /// Request method if applicable
    pub method: Option<String>,
    /// Connection or session identifier
    pub connection_id: Option<String>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl ErrorContext {
    /// Create a context for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Set the transport kind.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    /// Set the method name.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the connection id.
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    /// Attach extra context data.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Structured logger for crate errors.
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log an error with its context at the level its class warrants.
    pub fn log(error: &McpError, context: &ErrorContext) {
        let category = error.category();
        let recoverable = error.is_recoverable();
        let detail = json!({
            "operation": context.operation,
            "transport": context.transport,
            "method": context.method,
            "connection_id": context.connection_id,
            "extra": context.extra,
        });

        match ErrorLogLevel::from(error) {
            ErrorLogLevel::Error => error!(
                target: "harbor_mcp",
                error_category = category,
                error_recoverable = recoverable,
                operation = context.operation.as_str(),
                "{error} {detail}"
            ),
            ErrorLogLevel::Warning => warn!(
                target: "harbor_mcp",
                error_category = category,
                error_recoverable = recoverable,
                operation = context.operation.as_str(),
                "{error} {detail}"
            ),
            ErrorLogLevel::Info => info!(
                target: "harbor_mcp",
                error_category = category,
                error_recoverable = recoverable,
                operation = context.operation.as_str(),
                "{error} {detail}"
            ),
        }
    }
}

impl McpError {
    /// Log this error with the given context.
    pub fn log_with_context(&self, context: &ErrorContext) {
        ErrorLogger::log(self, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_error_class() {
        assert_eq!(
            ErrorLogLevel::from(&McpError::internal("x")),
            ErrorLogLevel::Error
        );
        assert_eq!(
            ErrorLogLevel::from(&McpError::timeout("x")),
            ErrorLogLevel::Warning
        );
        assert_eq!(
            ErrorLogLevel::from(&McpError::InvalidParams("x".into())),
            ErrorLogLevel::Info
        );
    }

    #[test]
    fn context_builder() {
        let context = ErrorContext::new("send")
            .with_transport("stdio")
            .with_method("tools/call")
            .with_connection_id("c-1")
            .with_extra("attempt", 2);
        assert_eq!(context.operation, "send");
        assert_eq!(context.transport.as_deref(), Some("stdio"));
        assert_eq!(context.method.as_deref(), Some("tools/call"));
        assert_eq!(context.extra["attempt"], 2);
    }

    #[test]
    fn logging_does_not_panic() {
        let context = ErrorContext::new("test");
        McpError::connection("refused").log_with_context(&context);
    }
}
