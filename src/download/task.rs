//! Per-URL download worker.
//!
//! A [`DownloadTask`] is owned by exactly one worker, which walks it through
//! `Pending → Building → Resolving → Streaming` to a terminal state and turns
//! it into an immutable [`Outcome`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::error::{DownloadError, ErrorKind};
use super::request::RequestTemplate;
use super::sink::{Destination, MergeSlot, OutputRouter, Sink};

/// Lifecycle state of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled, not started.
    Pending,
    /// Preparing the request.
    Building,
    /// Sending requests and following redirects.
    Resolving,
    /// Copying the body into the sink.
    Streaming,
    /// Every byte reached the sink.
    Succeeded {
        /// Body bytes written.
        bytes_written: u64,
    },
    /// Ended without a complete body.
    Failed(ErrorKind),
}

impl TaskState {
    /// True for `Succeeded` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed(_))
    }

    /// True while building, resolving or streaming.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Building | Self::Resolving | Self::Streaming)
    }
}

/// One URL's mutable download record.
#[derive(Debug)]
pub struct DownloadTask {
    /// Position in the input list.
    pub index: usize,
    /// URL as given in the input.
    pub url: Url,
    /// Number of times the request was built.
    pub attempt_count: u32,
    /// URLs visited, starting with `url`.
    pub redirect_chain: Vec<Url>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Pre-assigned handle into the merged output, if merging.
    pub merge_slot: Option<MergeSlot>,
}

impl DownloadTask {
    /// Creates a pending task.
    #[must_use]
    pub fn new(index: usize, url: Url, merge_slot: Option<MergeSlot>) -> Self {
        Self {
            redirect_chain: vec![url.clone()],
            index,
            url,
            attempt_count: 0,
            state: TaskState::Pending,
            merge_slot,
        }
    }

    fn transition(&mut self, next: TaskState) {
        debug!(index = self.index, from = ?self.state, to = ?next, "task state");
        self.state = next;
    }
}

/// Terminal, immutable record of one download.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Position in the input list.
    pub index: usize,
    /// URL as given in the input.
    pub url: Url,
    /// `Succeeded` or `Failed`.
    pub state: TaskState,
    /// Status of the last response received, if any.
    pub http_status: Option<u16>,
    /// Body bytes transferred to the sink.
    pub byte_count: u64,
    /// Wall time spent on the task.
    pub elapsed: Duration,
    /// URL of the final (non-redirect) response.
    pub final_url: Option<Url>,
    /// URLs visited, starting with `url`.
    pub redirect_chain: Vec<Url>,
    /// Where the body was written; `None` unless succeeded.
    pub destination: Option<Destination>,
    /// Human-readable failure message.
    pub error: Option<String>,
}

impl Outcome {
    /// True when the task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.state, TaskState::Succeeded { .. })
    }

    /// The failure kind, if the task failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.state {
            TaskState::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    /// Outcome for a URL that never got to run.
    #[must_use]
    pub fn not_started(index: usize, url: Url, error: &DownloadError) -> Self {
        Self {
            index,
            redirect_chain: vec![url.clone()],
            url,
            state: TaskState::Failed(error.kind()),
            http_status: None,
            byte_count: 0,
            elapsed: Duration::ZERO,
            final_url: None,
            destination: None,
            error: Some(error.to_string()),
        }
    }
}

/// Everything a worker needs, shared read-only by all workers of a run.
#[derive(Debug)]
pub struct WorkerContext {
    client: HttpClient,
    template: RequestTemplate,
    router: OutputRouter,
    max_redirects: u32,
    cancel: CancellationToken,
}

impl WorkerContext {
    /// Bundles the run-wide collaborators.
    #[must_use]
    pub fn new(
        client: HttpClient,
        template: RequestTemplate,
        router: OutputRouter,
        max_redirects: u32,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            template,
            router,
            max_redirects,
            cancel,
        })
    }
}

/// Progress gathered while driving a task; folded into the [`Outcome`].
#[derive(Debug, Default)]
struct Progress {
    http_status: Option<u16>,
    final_url: Option<Url>,
    destination: Option<Destination>,
    bytes: u64,
}

/// Runs `task` to a terminal state.
///
/// Never returns an error: every failure is recorded in the outcome. No other
/// task is affected by what happens here.
#[instrument(skip_all, fields(index = task.index, url = %task.url))]
pub async fn run_task(mut task: DownloadTask, ctx: &WorkerContext) -> Outcome {
    let started = Instant::now();
    let mut progress = Progress::default();

    let result = drive(&mut task, ctx, &mut progress).await;
    // Releases a merge slot that was never used so the writer can move on.
    task.merge_slot = None;

    let (state, error) = match result {
        Ok(bytes_written) => {
            info!(bytes = bytes_written, "download completed");
            (TaskState::Succeeded { bytes_written }, None)
        }
        Err(e) => {
            warn!(error = %e, "download failed");
            if progress.http_status.is_none() {
                progress.http_status = e.http_status_code();
            }
            progress.destination = None;
            (TaskState::Failed(e.kind()), Some(e.to_string()))
        }
    };
    task.transition(state);

    Outcome {
        index: task.index,
        url: task.url,
        state,
        http_status: progress.http_status,
        byte_count: progress.bytes,
        elapsed: started.elapsed(),
        final_url: progress.final_url,
        redirect_chain: task.redirect_chain,
        destination: progress.destination,
        error,
    }
}

async fn drive(
    task: &mut DownloadTask,
    ctx: &WorkerContext,
    progress: &mut Progress,
) -> Result<u64, DownloadError> {
    let cancel = &ctx.cancel;
    if cancel.is_cancelled() {
        return Err(DownloadError::cancelled(task.url.as_str()));
    }

    task.transition(TaskState::Building);
    task.attempt_count += 1;

    task.transition(TaskState::Resolving);
    let resolved = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(DownloadError::cancelled(task.url.as_str())),
        resolved = ctx.client.resolve(&ctx.template, &task.url, ctx.max_redirects) => resolved?,
    };
    progress.http_status = Some(resolved.status);
    progress.final_url = Some(resolved.final_url.clone());
    task.redirect_chain.clone_from(&resolved.redirect_chain);
    debug!(redirects = resolved.redirect_count(), status = resolved.status, "response resolved");

    task.transition(TaskState::Streaming);
    let mut sink = ctx
        .router
        .sink_for(task, resolved.content_disposition(), resolved.content_type())
        .await?;
    if let Some(modified) = resolved.last_modified() {
        sink.set_modified(modified);
    }
    progress.destination = Some(sink.destination());

    let mut stream = resolved.response.bytes_stream();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            next = stream.next() => Some(next),
        };
        let chunk = match next {
            None => return Err(abandon(sink, DownloadError::cancelled(task.url.as_str())).await),
            Some(None) => break,
            Some(Some(Err(e))) => {
                let error = DownloadError::partial_write(task.url.as_str(), progress.bytes, e);
                return Err(abandon(sink, error).await);
            }
            Some(Some(Ok(chunk))) => chunk,
        };

        let len = chunk.len() as u64;
        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            written = sink.write_chunk(chunk) => Some(written),
        };
        match written {
            None => return Err(abandon(sink, DownloadError::cancelled(task.url.as_str())).await),
            Some(Err(e)) => {
                let error = DownloadError::partial_write(task.url.as_str(), progress.bytes, e);
                return Err(abandon(sink, error).await);
            }
            Some(Ok(())) => progress.bytes += len,
        }
    }

    sink.finish()
        .await
        .map_err(|e| DownloadError::partial_write(task.url.as_str(), progress.bytes, e))
}

async fn abandon(sink: Sink, error: DownloadError) -> DownloadError {
    sink.abandon().await;
    error
}
