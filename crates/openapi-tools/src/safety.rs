//! Redaction helpers for outbound HTTP error messages.
//!
//! reqwest includes the full request URL in its error strings; query strings may carry
//! API keys (see [`crate::config::UpstreamAuth::Query`]), so they are stripped before an
//! error reaches logs or MCP clients.

use url::Url;

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
