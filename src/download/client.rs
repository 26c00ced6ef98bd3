//! HTTP client wrapper and redirect resolution.
//!
//! The wrapped reqwest client never follows redirects on its own; every hop
//! goes through [`HttpClient::resolve`] so the redirect limit, the visited
//! chain and the per-hop headers stay under our control.

use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LAST_MODIFIED, LOCATION};
use reqwest::{Client, StatusCode, redirect};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::request::RequestTemplate;

/// Status codes treated as redirects.
const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// HTTP client for resolving and streaming downloads.
///
/// Created once per run and shared (cheaply cloned) by every worker, taking
/// advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// A response whose redirects have been followed and whose status is not an error.
///
/// The body has not been read yet.
#[derive(Debug)]
pub struct ResolvedResponse {
    /// The live response, positioned at the start of the body.
    pub response: reqwest::Response,
    /// URL that produced the final response.
    pub final_url: Url,
    /// Final status code.
    pub status: u16,
    /// Every URL requested, starting with the original one.
    pub redirect_chain: Vec<Url>,
}

impl ResolvedResponse {
    /// Filename suggested by a `Content-Disposition` header, undecoded.
    #[must_use]
    pub fn content_disposition(&self) -> Option<&str> {
        header_str(&self.response, CONTENT_DISPOSITION.as_str())
    }

    /// Raw `Content-Type` header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        header_str(&self.response, CONTENT_TYPE.as_str())
    }

    /// `Last-Modified` header parsed as an HTTP date.
    #[must_use]
    pub fn last_modified(&self) -> Option<std::time::SystemTime> {
        header_str(&self.response, LAST_MODIFIED.as_str())
            .and_then(|value| httpdate::parse_http_date(value).ok())
    }

    /// Number of redirects followed.
    #[must_use]
    pub fn redirect_count(&self) -> usize {
        self.redirect_chain.len().saturating_sub(1)
    }
}

fn header_str<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes without any bytes arriving
    /// - Gzip decompression: enabled
    /// - Redirects: never followed automatically
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// `read` bounds each individual read, not the whole response, so a
    /// body that waits for the merged writer never times out while its
    /// connection stays healthy.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be
    /// initialized.
    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .gzip(true)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Issues a GET for `url` and follows redirects up to `max_redirects`.
    ///
    /// Every hop is built from the same `template`, so the User-Agent and
    /// credentials are sent on each request. A chain of exactly
    /// `max_redirects` redirects succeeds; one more fails.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] when a request
    ///   cannot be completed
    /// - [`DownloadError::TooManyRedirects`] when the limit is reached while
    ///   the server is still redirecting
    /// - [`DownloadError::InvalidRedirect`] when a redirect has no usable
    ///   `Location`
    /// - [`DownloadError::HttpStatus`] when the final status is 400 or above
    #[instrument(skip(self, template), fields(url = %url))]
    pub async fn resolve(
        &self,
        template: &RequestTemplate,
        url: &Url,
        max_redirects: u32,
    ) -> Result<ResolvedResponse, DownloadError> {
        let mut current = url.clone();
        let mut chain = vec![url.clone()];
        let mut redirects: u32 = 0;

        loop {
            let response = self
                .client
                .execute(template.build(&current))
                .await
                .map_err(|e| DownloadError::from_send(current.as_str(), e))?;
            let status = response.status();

            if REDIRECT_STATUSES.contains(&status) {
                if redirects >= max_redirects {
                    debug!(redirects, max_redirects, "redirect limit reached");
                    return Err(DownloadError::too_many_redirects(url.as_str(), max_redirects));
                }
                let next = redirect_target(&current, &response)?;
                debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
                redirects += 1;
                chain.push(next.clone());
                current = next;
                continue;
            }

            if status.is_client_error() || status.is_server_error() {
                return Err(DownloadError::http_status(current.as_str(), status.as_u16()));
            }

            debug!(status = status.as_u16(), redirects, final_url = %current, "resolved");
            return Ok(ResolvedResponse {
                response,
                final_url: current,
                status: status.as_u16(),
                redirect_chain: chain,
            });
        }
    }

    /// Fetches `url` (following redirects) and returns the body as text.
    ///
    /// Used for small documents such as remote URL lists, never for downloads.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`resolve`](Self::resolve), or
    /// [`DownloadError::Network`] if the body cannot be read.
    pub async fn fetch_text(
        &self,
        template: &RequestTemplate,
        url: &Url,
        max_redirects: u32,
    ) -> Result<String, DownloadError> {
        let resolved = self.resolve(template, url, max_redirects).await?;
        resolved
            .response
            .text()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))
    }
}

/// Resolves the `Location` of a redirect response against the URL that produced it.
fn redirect_target(current: &Url, response: &reqwest::Response) -> Result<Url, DownloadError> {
    let status = response.status().as_u16();
    let Some(raw) = response.headers().get(LOCATION) else {
        return Err(DownloadError::invalid_redirect(current.as_str(), status, None));
    };
    let Ok(location) = raw.to_str() else {
        return Err(DownloadError::invalid_redirect(
            current.as_str(),
            status,
            Some(String::from_utf8_lossy(raw.as_bytes()).into_owned()),
        ));
    };
    match current.join(location) {
        Ok(next) if matches!(next.scheme(), "http" | "https") => Ok(next),
        _ => Err(DownloadError::invalid_redirect(
            current.as_str(),
            status,
            Some(location.to_string()),
        )),
    }
}
