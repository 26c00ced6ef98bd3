//! Outbound request construction.
//!
//! Header values are validated once when the template is created, so building
//! a request for a URL is infallible and side-effect free.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, Request};
use url::Url;

use crate::config::{Config, ConfigError, Credentials};

/// Prepared headers applied to every request of a run, including redirect hops.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    headers: HeaderMap,
}

impl RequestTemplate {
    /// Builds the template from the run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUserAgent`] if the User-Agent is not a
    /// valid header value.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(&config.user_agent, config.credentials.as_ref())
    }

    /// Builds a template from a User-Agent and optional credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUserAgent`] if `user_agent` is not a
    /// valid header value.
    pub fn new(user_agent: &str, credentials: Option<&Credentials>) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(user_agent).map_err(|_| ConfigError::InvalidUserAgent {
            value: user_agent.to_string(),
        })?;
        headers.insert(USER_AGENT, agent);
        if let Some(credentials) = credentials {
            headers.insert(AUTHORIZATION, basic_auth_value(credentials));
        }
        Ok(Self { headers })
    }

    /// Builds a GET request for `url` carrying the template's headers.
    #[must_use]
    pub fn build(&self, url: &Url) -> Request {
        let mut request = Request::new(Method::GET, url.clone());
        request.headers_mut().extend(self.headers.clone());
        request
    }

    /// Returns true when the template attaches an `Authorization` header.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }
}

fn basic_auth_value(credentials: &Credentials) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{}:{}", credentials.user(), credentials.password()));
    // Base64 output is always visible ASCII, so this cannot fail.
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    value.set_sensitive(true);
    value
}
