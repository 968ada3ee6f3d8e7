//! OpenAPI -> MCP tooling.
//!
//! Turns the operations of an `OpenAPI` 3.0 document into MCP tools and executes `tools/call`
//! as outbound HTTP requests against the API's base URL. The caller's bearer credential can be
//! forwarded upstream (see [`config::UpstreamAuth::ForwardCaller`]).
//!
//! It intentionally contains **no** MCP transport logic; `toto-mcp-server` owns that.

pub mod config;
pub mod error;
pub mod resolver;
pub mod runtime;
pub mod safety;
pub mod semantics;
