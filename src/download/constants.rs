//! Constants for the download module (timeouts, concurrency, redirects).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout for a single response read.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default redirect limit per URL.
pub const DEFAULT_MAX_REDIRECTS: u32 = 20;

/// Body chunks a worker may queue for the merged writer before it has to wait.
pub const MERGE_WINDOW_CHUNKS: usize = 16;

/// Upper bound on numeric suffixes tried when a filename is taken.
pub(crate) const MAX_NAME_SUFFIX: usize = 1000;
