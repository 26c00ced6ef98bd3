//! Loading the list of URLs to download.
//!
//! URLs come from positional arguments first, then from an optional list
//! (`-i`): a local file, standard input (`-`), or an `http(s)` URL whose body
//! is fetched with the run's client. Lists hold one URL per line; blank lines
//! are ignored.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use url::Url;

use crate::download::{DownloadError, HttpClient, RequestTemplate};

/// Errors raised while assembling the URL list. All of them are fatal.
#[derive(Debug, Error)]
pub enum InputError {
    /// A value could not be parsed as a URL.
    #[error("invalid URL {value:?}{}: {source}", line_suffix(.line))]
    InvalidUrl {
        /// The rejected value.
        value: String,
        /// 1-based line in the list, if it came from one.
        line: Option<usize>,
        /// The parse error.
        #[source]
        source: url::ParseError,
    },

    /// The URL scheme is not `http` or `https`.
    #[error("unsupported URL scheme {scheme:?} in {value:?}{}", line_suffix(.line))]
    UnsupportedScheme {
        /// The rejected value.
        value: String,
        /// The offending scheme.
        scheme: String,
        /// 1-based line in the list, if it came from one.
        line: Option<usize>,
    },

    /// The local list or standard input could not be read.
    #[error("cannot read URL list {source_name}: {source}")]
    Read {
        /// File path, or `-` for standard input.
        source_name: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The remote list could not be fetched.
    #[error("cannot fetch URL list: {0}")]
    Fetch(#[source] DownloadError),
}

#[allow(clippy::ref_option)]
fn line_suffix(line: &Option<usize>) -> String {
    line.map(|n| format!(" on line {n}")).unwrap_or_default()
}

/// Where an `-i` list is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlSource {
    /// Standard input.
    Stdin,
    /// A local file.
    File(PathBuf),
    /// A remote list fetched over HTTP(S).
    Remote(Url),
}

impl UrlSource {
    /// Interprets an `-i` argument: `-` is stdin, an `http(s)` URL is remote,
    /// anything else is a local path.
    #[must_use]
    pub fn from_arg(value: &str) -> Self {
        if value == "-" {
            return Self::Stdin;
        }
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::File(PathBuf::from(value)),
        }
    }
}

impl fmt::Display for UrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "-"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Parses one URL, accepting only `http` and `https`.
///
/// # Errors
///
/// Returns [`InputError::InvalidUrl`] or [`InputError::UnsupportedScheme`].
pub fn parse_url(value: &str, line: Option<usize>) -> Result<Url, InputError> {
    let url = Url::parse(value).map_err(|source| InputError::InvalidUrl {
        value: value.to_string(),
        line,
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InputError::UnsupportedScheme {
            value: value.to_string(),
            scheme: url.scheme().to_string(),
            line,
        });
    }
    Ok(url)
}

/// Parses a list with one URL per line, skipping blank lines.
///
/// # Errors
///
/// Returns the first malformed or non-HTTP(S) line as an error.
pub fn parse_url_list(text: &str) -> Result<Vec<Url>, InputError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| parse_url(line, Some(n)))
        .collect()
}

/// Assembles the URL list: positional arguments, then the `-i` list.
///
/// # Errors
///
/// Returns [`InputError`] for any unreadable source or invalid URL.
pub async fn load_urls(
    positional: &[String],
    list: Option<&UrlSource>,
    client: &HttpClient,
    template: &RequestTemplate,
    max_redirects: u32,
) -> Result<Vec<Url>, InputError> {
    let mut urls = positional
        .iter()
        .map(|value| parse_url(value.trim(), None))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(source) = list {
        let text = match source {
            UrlSource::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .map_err(|source| InputError::Read {
                        source_name: "-".to_string(),
                        source,
                    })?;
                text
            }
            UrlSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| InputError::Read {
                        source_name: path.display().to_string(),
                        source,
                    })?
            }
            UrlSource::Remote(url) => {
                debug!(url = %url, "fetching remote URL list");
                client
                    .fetch_text(template, url, max_redirects)
                    .await
                    .map_err(InputError::Fetch)?
            }
        };
        let listed = parse_url_list(&text)?;
        info!(source = %source, count = listed.len(), "loaded URL list");
        urls.extend(listed);
    }

    Ok(urls)
}
