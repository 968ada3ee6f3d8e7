//! Bearer credential extraction.
//!
//! This crate is used by:
//! - `toto-mcp-server` (tool calls and the optional `/mcp` guard)
//! - `toto-openapi-tools` (forwarding the caller's credential upstream)
//!
//! The core is [`extract_bearer_token`], a pure function over a [`HeaderSet`]. The [`web`]
//! module maps its errors onto HTTP responses.

pub mod error;
pub mod extract;
pub mod web;

pub use error::{AuthorizationError, Result};
pub use extract::{AUTHORIZATION, BEARER_SCHEME, Credential, HeaderSet, extract_bearer_token};
