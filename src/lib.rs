//! pget core library
//!
//! Concurrent HTTP GET downloads of a list of URLs. Each URL is fetched once
//! (following redirects up to a limit), optionally authenticated, and streamed
//! either into its own file or into a single merged output that preserves the
//! input order.
//!
//! # Architecture
//!
//! - [`config`] - Immutable run configuration
//! - [`download`] - Request building, redirect resolution, sinks, workers and
//!   the bounded scheduler
//! - [`input`] - Loading the URL list from arguments, files, stdin or a remote list
//! - [`report`] - Per-outcome progress lines, summary and exit codes

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod input;
pub mod report;
#[cfg(test)]
pub mod test_support;
mod user_agent;

// Re-export commonly used types
pub use config::{Config, ConfigError, Credentials, MergeTarget, OutputMode};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_REDIRECTS, Destination, DownloadEngine, DownloadError,
    EngineError, ErrorKind, HttpClient, Outcome, OutcomeObserver, RequestTemplate, TaskState,
};
pub use input::{InputError, UrlSource, load_urls};
pub use report::{ExitStatus, Reporter, exit_code};
pub use user_agent::default_user_agent;
