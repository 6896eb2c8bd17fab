//! Envelope validation and the inbound decode pipeline.
//!
//! Raw frames arriving from a transport are decoded here into an
//! [`IncomingMessage`]. The pipeline follows the JSON-RPC shape rules: a
//! `method` with an `id` is a request, a `method` without an `id` is a
//! notification, an `id` with an `error` is an error response, an `id` with
//! a `result` is a success response, and anything else is invalid.

use serde_json::Value;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{
    ErrorObject, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    JSONRPC_VERSION,
};

/// A decoded inbound envelope, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// A request from the peer that expects a response
    Request(JsonRpcRequest),
    /// A fire-and-forget notification
    Notification(JsonRpcNotification),
    /// A successful response to one of our requests
    Response(JsonRpcResponse),
    /// An error response to one of our requests
    Error(JsonRpcError),
}

/// Decode one frame into an [`IncomingMessage`].
///
/// Frames that are not valid JSON fail with [`McpError::ParseError`]; frames
/// that are JSON but not a valid envelope fail with
/// [`McpError::InvalidRequest`].
pub fn decode_message(raw: &[u8]) -> McpResult<IncomingMessage> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| McpError::ParseError(format!("invalid JSON frame: {e}")))?;
    classify_envelope(value)
}

/// Classify an already-parsed JSON value.
pub fn classify_envelope(value: Value) -> McpResult<IncomingMessage> {
    let object = value
        .as_object()
        .ok_or_else(|| McpError::InvalidRequest("envelope is not a JSON object".to_string()))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(McpError::InvalidRequest(format!(
                "unsupported jsonrpc version: {other}"
            )));
        }
        None => {
            return Err(McpError::InvalidRequest(
                "missing jsonrpc version".to_string(),
            ));
        }
    }

    let has_method = object.contains_key("method");
    let has_id = object.contains_key("id");

    if has_method && has_id {
        let request: JsonRpcRequest = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidRequest(format!("malformed request: {e}")))?;
        validate_request(&request)?;
        return Ok(IncomingMessage::Request(request));
    }

    if has_method {
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidRequest(format!("malformed notification: {e}")))?;
        validate_notification(&notification)?;
        return Ok(IncomingMessage::Notification(notification));
    }

    if has_id && object.contains_key("error") {
        let error: JsonRpcError = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidRequest(format!("malformed error response: {e}")))?;
        validate_id(&error.id)?;
        validate_error_object(&error.error)?;
        return Ok(IncomingMessage::Error(error));
    }

    if has_id && object.contains_key("result") {
        let response: JsonRpcResponse = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidRequest(format!("malformed response: {e}")))?;
        validate_id(&response.id)?;
        return Ok(IncomingMessage::Response(response));
    }

    Err(McpError::InvalidRequest(
        "envelope is neither request, response, nor notification".to_string(),
    ))
}

/// Validate an outbound or inbound request envelope.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "unsupported jsonrpc version: {}",
            request.jsonrpc
        )));
    }
    validate_id(&request.id)?;
    validate_method(&request.method)
}

/// Validate a notification envelope.
pub fn validate_notification(notification: &JsonRpcNotification) -> McpResult<()> {
    if notification.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "unsupported jsonrpc version: {}",
            notification.jsonrpc
        )));
    }
    validate_method(&notification.method)
}

/// Validate a request id against the envelope rules.
pub fn validate_id(id: &RequestId) -> McpResult<()> {
    id.validate().map_err(McpError::InvalidRequest)
}

/// Validate an error object: an integer code and a non-empty message.
pub fn validate_error_object(error: &ErrorObject) -> McpResult<()> {
    if error.message.is_empty() {
        return Err(McpError::InvalidRequest(
            "error object with empty message".to_string(),
        ));
    }
    Ok(())
}

fn validate_method(method: &str) -> McpResult<()> {
    if method.is_empty() {
        return Err(McpError::InvalidRequest("empty method name".to_string()));
    }
    Ok(())
}
