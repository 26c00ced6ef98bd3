//! Bounded-concurrency scheduler for a batch of URLs.
//!
//! # Overview
//!
//! [`DownloadEngine::run`] dispatches one worker per URL in input order. A
//! semaphore of `config.concurrency` permits is created for each run; a
//! permit is acquired before each worker is spawned and held until its task
//! is terminal, so at most `concurrency` downloads are ever in flight. Completion order is unconstrained; the returned outcomes are
//! sorted by input index.
//!
//! # Example
//!
//! ```no_run
//! use pget_core::{Config, DownloadEngine, HttpClient};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new(vec![Url::parse("https://example.com/a.bin")?]);
//! let engine = DownloadEngine::new();
//! let outcomes = engine
//!     .run(&config, &HttpClient::new(), CancellationToken::new())
//!     .await?;
//! println!("{} succeeded", outcomes.iter().filter(|o| o.is_success()).count());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::constants::MERGE_WINDOW_CHUNKS;
use super::error::DownloadError;
use super::filename::NameRegistry;
use super::request::RequestTemplate;
use super::sink::{MergeSlot, MergeWriter, OutputRouter};
use super::task::{DownloadTask, Outcome, WorkerContext, run_task};
use crate::config::{Config, ConfigError, OutputMode};

/// Error type for download engine setup.
///
/// Per-URL failures never surface here; they are recorded in each [`Outcome`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The output directory or merged target could not be prepared.
    #[error("cannot prepare output {path}: {source}")]
    Output {
        /// The directory or file that failed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Receives each outcome as soon as its task is terminal.
///
/// Called from worker tasks, in completion order.
pub trait OutcomeObserver: Send + Sync {
    /// Handles one terminal outcome.
    fn on_outcome(&self, outcome: &Outcome);
}

/// Concurrent download scheduler.
///
/// The concurrency bound comes from the [`Config`] passed to each
/// [`run`](Self::run), so one engine can serve configs with different limits.
#[derive(Default)]
pub struct DownloadEngine {
    observer: Option<Arc<dyn OutcomeObserver>>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates a download engine without an observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an observer notified of every outcome as it completes.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OutcomeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Downloads every URL in `config` and returns one outcome per URL.
    ///
    /// Tasks still pending or in flight when `cancel` fires (or when the
    /// configured deadline passes) end as `Failed(Cancelled)`; tasks that
    /// already succeeded are untouched.
    ///
    /// # Errors
    ///
    /// Only setup failures that happen before any URL is scheduled:
    /// - [`EngineError::Config`] if the configuration is invalid, including
    ///   a concurrency outside 1..=100
    /// - [`EngineError::Output`] if the output directory cannot be created or
    ///   the merged target cannot be opened
    /// - [`EngineError::SemaphoreClosed`] if the semaphore is closed
    #[instrument(skip(self, config, client, cancel), fields(urls = config.urls.len(), concurrency = config.concurrency))]
    pub async fn run(
        &self,
        config: &Config,
        client: &HttpClient,
        cancel: CancellationToken,
    ) -> Result<Vec<Outcome>, EngineError> {
        config.validate()?;
        let template = RequestTemplate::from_config(config)?;
        let total = config.urls.len();
        let semaphore = Arc::new(Semaphore::new(config.concurrency));

        let (router, slots, merge_handle) = prepare_output(&config.output_mode, total).await?;
        let mut slots = slots.into_iter();
        let ctx = WorkerContext::new(
            client.clone(),
            template,
            router,
            config.max_redirects,
            cancel.clone(),
        );
        let deadline = config.deadline.map(|limit| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(limit) => {
                        warn!(timeout_secs = limit.as_secs_f64(), "global timeout reached, cancelling downloads");
                        cancel.cancel();
                    }
                    () = cancel.cancelled() => {}
                }
            })
        });

        info!(total, "starting downloads");

        let mut outcomes = Vec::with_capacity(total);
        let mut handles: Vec<(usize, Url, JoinHandle<Outcome>)> = Vec::with_capacity(total);

        for (index, url) in config.urls.iter().enumerate() {
            let slot: Option<MergeSlot> = slots.next();

            // Blocks while `concurrency` tasks are in flight.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    Some(permit.map_err(|_| EngineError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                drop(slot);
                let outcome =
                    Outcome::not_started(index, url.clone(), &DownloadError::cancelled(url.as_str()));
                self.notify(&outcome);
                outcomes.push(outcome);
                continue;
            };

            debug!(index, url = %url, "dispatching");
            let ctx = Arc::clone(&ctx);
            let observer = self.observer.clone();
            let task = DownloadTask::new(index, url.clone(), slot);
            handles.push((
                index,
                url.clone(),
                tokio::spawn(async move {
                    // Permit is dropped when this block exits (RAII)
                    let _permit = permit;
                    let outcome = run_task(task, &ctx).await;
                    if let Some(observer) = observer {
                        observer.on_outcome(&outcome);
                    }
                    outcome
                }),
            ));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        for (index, url, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(index, url = %url, error = %e, "download task panicked");
                    let mut outcome =
                        Outcome::not_started(index, url.clone(), &DownloadError::cancelled(url.as_str()));
                    outcome.error = Some(format!("worker task aborted: {e}"));
                    self.notify(&outcome);
                    outcomes.push(outcome);
                }
            }
        }
        drop(ctx);

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        if let Some(handle) = merge_handle {
            match handle.await {
                Ok(Ok(bytes)) => debug!(bytes, "merged output closed"),
                Ok(Err(e)) => warn!(error = %e, "merged output failed"),
                Err(e) => warn!(error = %e, "merged output writer panicked"),
            }
        }

        outcomes.sort_by_key(|outcome| outcome.index);
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            succeeded,
            failed = total - succeeded,
            total,
            "downloads complete"
        );
        Ok(outcomes)
    }

    fn notify(&self, outcome: &Outcome) {
        if let Some(observer) = &self.observer {
            observer.on_outcome(outcome);
        }
    }
}

type MergeHandle = JoinHandle<std::io::Result<u64>>;

/// Creates the output directory, or opens the merged target and starts its writer.
async fn prepare_output(
    mode: &OutputMode,
    total: usize,
) -> Result<(OutputRouter, Vec<MergeSlot>, Option<MergeHandle>), EngineError> {
    match mode {
        OutputMode::PerFile { directory } => {
            tokio::fs::create_dir_all(directory)
                .await
                .map_err(|source| EngineError::Output {
                    path: directory.clone(),
                    source,
                })?;
            Ok((
                OutputRouter::PerFile(NameRegistry::new(directory.clone())),
                Vec::new(),
                None,
            ))
        }
        OutputMode::Merged(target) => {
            let writer = MergeWriter::open(target)
                .await
                .map_err(|source| EngineError::Output {
                    path: PathBuf::from(target.to_string()),
                    source,
                })?;
            let (slots, handle) = writer.spawn(total, MERGE_WINDOW_CHUNKS);
            Ok((OutputRouter::Merged(target.clone()), slots, Some(handle)))
        }
    }
}
