//! Default User-Agent string sent with every request unless `-U` overrides it.

/// HTTP stack identifier appended after the tool name.
const HTTP_STACK: &str = "reqwest";

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("pget/{version} ({HTTP_STACK})")
}
