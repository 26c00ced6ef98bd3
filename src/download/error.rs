//! Error types for the download module.
//!
//! [`DownloadError`] carries full context for logs and the final report;
//! [`ErrorKind`] is the small, copyable classification stored in task state
//! and used for exit codes.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a single URL's download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The redirect limit was reached while the server was still redirecting.
    #[error("too many redirects downloading {url} (limit {limit})")]
    TooManyRedirects {
        /// The URL originally requested.
        url: String,
        /// The configured redirect limit.
        limit: u32,
    },

    /// A redirect response had no usable `Location` header.
    #[error("HTTP {status} redirect without a usable Location downloading {url}")]
    InvalidRedirect {
        /// The URL that answered with the redirect.
        url: String,
        /// The redirect status code.
        status: u16,
        /// The raw `Location` value, if one was present.
        location: Option<String>,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The output destination could not be created.
    #[error("IO error opening {path}: {source}")]
    Io {
        /// The destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the body or writing it to the sink failed after streaming began.
    #[error("partial write downloading {url} after {bytes_written} bytes: {source}")]
    PartialWrite {
        /// The URL being streamed.
        url: String,
        /// Bytes handed to the sink before the failure.
        bytes_written: u64,
        /// The body-read or sink-write error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The run was cancelled while this download was pending or in flight.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL that was cancelled.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Classifies a reqwest send error as a timeout or a network error.
    pub fn from_send(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a too-many-redirects error.
    pub fn too_many_redirects(url: impl Into<String>, limit: u32) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            limit,
        }
    }

    /// Creates an invalid-redirect error.
    pub fn invalid_redirect(url: impl Into<String>, status: u16, location: Option<String>) -> Self {
        Self::InvalidRedirect {
            url: url.into(),
            status,
            location,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a partial-write error.
    pub fn partial_write(
        url: impl Into<String>,
        bytes_written: u64,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::PartialWrite {
            url: url.into(),
            bytes_written,
            source: source.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns the classification recorded in the task's terminal state.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::Network,
            Self::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            Self::InvalidRedirect { .. } => ErrorKind::InvalidRedirect,
            Self::HttpStatus { status, .. } => ErrorKind::HttpStatus(*status),
            Self::Io { .. } => ErrorKind::Io,
            Self::PartialWrite { .. } => ErrorKind::PartialWrite,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::InvalidRedirect { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure classification of a terminal task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, DNS, TLS or timeout failure before the body started.
    Network,
    /// Redirect limit reached.
    TooManyRedirects,
    /// Redirect without a usable `Location`.
    InvalidRedirect,
    /// Final response status was 400 or above.
    HttpStatus(u16),
    /// Body read or sink write failed mid-stream.
    PartialWrite,
    /// Output destination could not be created.
    Io,
    /// Cancelled by signal or global deadline.
    Cancelled,
}

impl ErrorKind {
    /// Process exit code for this failure kind.
    ///
    /// | kind | code |
    /// |---|---|
    /// | `Cancelled` | 1 |
    /// | `Io`, `PartialWrite` | 3 |
    /// | `Network` | 4 |
    /// | `TooManyRedirects`, `InvalidRedirect` | 7 |
    /// | `HttpStatus` | 8 |
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Cancelled => 1,
            Self::Io | Self::PartialWrite => 3,
            Self::Network => 4,
            Self::TooManyRedirects | Self::InvalidRedirect => 7,
            Self::HttpStatus(_) => 8,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::InvalidRedirect => write!(f, "invalid redirect"),
            Self::HttpStatus(status) => write!(f, "HTTP {status}"),
            Self::PartialWrite => write!(f, "partial write"),
            Self::Io => write!(f, "IO error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
