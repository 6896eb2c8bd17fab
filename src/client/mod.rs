//! MCP client: the endpoint state machine and its configuration.

pub mod builder;
pub mod endpoint;
pub mod request_handler;

pub use builder::EndpointBuilder;
pub use endpoint::{Endpoint, EndpointConfig, EndpointState, PendingCall, ProgressHandler};
pub use request_handler::{RootsProvider, SamplingHandler, ServerRequestDispatcher};
