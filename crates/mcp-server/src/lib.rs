//! MCP server over streamable HTTP whose tools act with the caller's bearer credential.
//!
//! - [`handler::TotoMcpServer`]: the rmcp `ServerHandler` (built-in tools + `OpenAPI` sources)
//! - [`app`]: axum router, optional `require_bearer` guard, graceful shutdown
//! - [`config`]: clap flags and the YAML config file

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod topics;

pub use error::{Result, ServerError};
