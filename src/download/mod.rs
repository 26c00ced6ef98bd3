//! Concurrent HTTP GET downloads streamed to files or a merged output.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Manual redirect following with a per-URL limit
//! - Filenames from Content-Disposition, the URL path, or the Content-Type
//! - Duplicate filename handling (adds numeric suffix)
//! - Merged output written in input order by a single writer task
//! - Bounded concurrency with per-task failure isolation
//!
//! # Example
//!
//! ```no_run
//! use pget_core::download::{HttpClient, RequestTemplate};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let template = RequestTemplate::new("pget-example/1.0", None)?;
//! let resolved = client
//!     .resolve(&template, &Url::parse("https://example.com/paper.pdf")?, 20)
//!     .await?;
//! println!("{} after {} redirects", resolved.status, resolved.redirect_count());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod filename;
mod request;
mod sink;
mod task;

pub use client::{HttpClient, ResolvedResponse};
pub use constants::{DEFAULT_CONCURRENCY, DEFAULT_MAX_REDIRECTS};
pub use engine::{DownloadEngine, EngineError, OutcomeObserver};
pub use error::{DownloadError, ErrorKind};
pub use filename::{NameRegistry, derive_filename};
pub use request::RequestTemplate;
pub use sink::{Destination, MergeSlot, MergeWriter, OutputRouter, Sink};
pub use task::{DownloadTask, Outcome, TaskState, WorkerContext, run_task};
