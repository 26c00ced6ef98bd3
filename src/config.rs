//! Run configuration shared (read-only) by every component.
//!
//! A [`Config`] is assembled once by the caller (the CLI, or a test) and then
//! passed by reference into the engine. Nothing mutates it during a run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_REDIRECTS, MAX_CONCURRENCY,
    MIN_CONCURRENCY, READ_TIMEOUT_SECS,
};
use crate::user_agent::default_user_agent;

/// Errors raised while validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Concurrency outside the supported range.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// A timeout was configured as zero.
    #[error("{name} must be greater than zero")]
    ZeroTimeout {
        /// Which timeout was zero.
        name: &'static str,
    },

    /// The User-Agent cannot be sent as an HTTP header.
    #[error("invalid user agent {value:?}: must be non-empty visible ASCII")]
    InvalidUserAgent {
        /// The rejected value.
        value: String,
    },
}

/// Where the merged output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeTarget {
    /// Process standard output (`-O -`).
    Stdout,
    /// A file created (truncated) once at startup.
    File(PathBuf),
}

impl MergeTarget {
    /// Interprets an `-O` argument: `-` means standard output.
    #[must_use]
    pub fn from_arg(value: &str) -> Self {
        if value == "-" {
            Self::Stdout
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

impl fmt::Display for MergeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "-"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How downloaded bodies are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// One file per URL inside `directory`.
    PerFile {
        /// Directory that receives the files (created if missing).
        directory: PathBuf,
    },
    /// All bodies concatenated, in input order, into one destination.
    Merged(MergeTarget),
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::PerFile {
            directory: PathBuf::from("."),
        }
    }
}

/// User/password pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// URLs to download, in input order.
    pub urls: Vec<Url>,
    /// Maximum number of redirects followed per URL.
    pub max_redirects: u32,
    /// Per-file or merged output.
    pub output_mode: OutputMode,
    /// Suppress per-outcome lines and the summary.
    pub quiet: bool,
    /// User-Agent header value.
    pub user_agent: String,
    /// Optional basic-auth credentials attached to every request.
    pub credentials: Option<Credentials>,
    /// Maximum number of downloads in flight at once.
    pub concurrency: usize,
    /// TCP/TLS connect timeout per request.
    pub connect_timeout: Duration,
    /// Idle timeout for each read of a response.
    ///
    /// Reset whenever bytes arrive, so a long download that keeps making
    /// progress never hits it.
    pub read_timeout: Duration,
    /// Global deadline for the whole run; tasks still running are cancelled.
    pub deadline: Option<Duration>,
}

impl Config {
    /// Creates a configuration with default settings for the given URLs.
    #[must_use]
    pub fn new(urls: Vec<Url>) -> Self {
        Self {
            urls,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            output_mode: OutputMode::default(),
            quiet: false,
            user_agent: default_user_agent(),
            credentials: None,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            deadline: None,
        }
    }

    /// Sets the output mode.
    #[must_use]
    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    /// Sets the redirect limit.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets basic-auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the User-Agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets quiet mode.
    #[must_use]
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Sets the per-request connect and read timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Sets the global run deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Checks value ranges that the type system does not enforce.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for out-of-range concurrency, zero timeouts, or
    /// a User-Agent that is not a valid header value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "connect timeout",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "read timeout",
            });
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroTimeout { name: "timeout" });
        }
        if self.user_agent.trim().is_empty() || HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ConfigError::InvalidUserAgent {
                value: self.user_agent.clone(),
            });
        }
        Ok(())
    }
}
