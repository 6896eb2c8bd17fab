//! MCP protocol layer: typed records, method registry, envelope codec.
//!
//! - [`types`]: request ids, capabilities, tool/resource/prompt records, and
//!   the JSON-RPC envelope structs
//! - [`messages`]: per-method parameter and result types
//! - [`methods`]: method name constants and the capability registry
//! - [`validation`]: envelope validation and the inbound decode pipeline

pub mod messages;
pub mod methods;
pub mod types;
pub mod validation;

pub use types::{JSONRPC_VERSION, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS};
