//! Output routing: per-URL files or one merged, input-ordered stream.
//!
//! In merged mode a single [`MergeWriter`] task owns the destination. Each URL
//! gets a [`MergeSlot`] feeding its own bounded channel, and the writer drains
//! the channels strictly in URL order, so bytes of a later URL wait (up to the
//! window) until every earlier URL has finished or given up.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::DownloadError;
use super::filename::{NameRegistry, derive_filename};
use super::task::DownloadTask;
use crate::config::MergeTarget;

/// Where a download's bytes ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A file of its own.
    File(PathBuf),
    /// The shared merged output.
    Merged(MergeTarget),
}

impl Destination {
    /// True when the bytes went to standard output.
    #[must_use]
    pub fn is_stdout(&self) -> bool {
        matches!(self, Self::Merged(MergeTarget::Stdout))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Merged(target) => write!(f, "{target}"),
        }
    }
}

/// Owned output destination for one download.
#[derive(Debug)]
pub enum Sink {
    /// Exclusive file for this URL.
    File(FileSink),
    /// This URL's handle into the merged output.
    Merged(MergeSlot),
}

impl Sink {
    /// Appends one body chunk.
    ///
    /// # Errors
    ///
    /// Returns the write error, or `BrokenPipe` if the merged writer stopped.
    pub async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        match self {
            Self::File(sink) => sink.write_chunk(&chunk).await,
            Self::Merged(slot) => slot.write_chunk(chunk).await,
        }
    }

    /// Flushes every byte and returns the total written for this URL.
    ///
    /// # Errors
    ///
    /// Returns the flush error or, in merged mode, the writer's error.
    pub async fn finish(self) -> io::Result<u64> {
        match self {
            Self::File(sink) => sink.finish().await,
            Self::Merged(slot) => slot.finish().await,
        }
    }

    /// Discards the output after a failure. Partial files are removed.
    pub async fn abandon(self) {
        match self {
            Self::File(sink) => sink.abandon().await,
            Self::Merged(slot) => drop(slot),
        }
    }

    /// Modification time applied to a file once it is complete.
    pub fn set_modified(&mut self, time: SystemTime) {
        if let Self::File(sink) = self {
            sink.modified = Some(time);
        }
    }

    /// Where this sink writes.
    #[must_use]
    pub fn destination(&self) -> Destination {
        match self {
            Self::File(sink) => Destination::File(sink.path.clone()),
            Self::Merged(slot) => Destination::Merged(slot.target.clone()),
        }
    }
}

/// Buffered writer over a file created for exactly one URL.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    modified: Option<SystemTime>,
}

impl FileSink {
    fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
            modified: None,
        }
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self) -> io::Result<u64> {
        if let Err(e) = self.writer.flush().await {
            self.abandon().await;
            return Err(e);
        }
        if let Some(modified) = self.modified {
            let file = self.writer.into_inner().into_std().await;
            let path = self.path.clone();
            // An mtime we cannot set is not worth failing a complete download.
            match tokio::task::spawn_blocking(move || file.set_modified(modified)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "could not set modification time"),
                Err(e) => warn!(path = %path.display(), error = %e, "could not set modification time"),
            }
        }
        Ok(self.bytes_written)
    }

    async fn abandon(self) {
        let Self { path, writer, .. } = self;
        drop(writer);
        debug!(path = %path.display(), "cleaning up partial file after error");
        let _ = tokio::fs::remove_file(&path).await;
    }
}

enum MergeFrame {
    Chunk(Bytes),
    Finish(oneshot::Sender<io::Result<u64>>),
}

/// A task's exclusive, ordered channel into the merged output.
///
/// Dropping a slot without calling [`finish`](Self::finish) tells the writer
/// to move on to the next URL.
pub struct MergeSlot {
    index: usize,
    target: MergeTarget,
    tx: mpsc::Sender<MergeFrame>,
}

impl fmt::Debug for MergeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeSlot")
            .field("index", &self.index)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl MergeSlot {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(MergeFrame::Chunk(chunk))
            .await
            .map_err(|_| writer_gone())
    }

    async fn finish(self) -> io::Result<u64> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(MergeFrame::Finish(ack_tx))
            .await
            .map_err(|_| writer_gone())?;
        ack_rx.await.map_err(|_| writer_gone())?
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "merged output writer stopped")
}

/// Sole owner of the merged destination.
pub struct MergeWriter {
    target: MergeTarget,
    output: Box<dyn AsyncWrite + Send + Unpin>,
}

impl fmt::Debug for MergeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeWriter")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl MergeWriter {
    /// Opens the merged destination once, truncating a file target.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the target file cannot be created.
    pub async fn open(target: &MergeTarget) -> io::Result<Self> {
        let output: Box<dyn AsyncWrite + Send + Unpin> = match target {
            MergeTarget::Stdout => Box::new(tokio::io::stdout()),
            MergeTarget::File(path) => Box::new(File::create(path).await?),
        };
        Ok(Self {
            target: target.clone(),
            output,
        })
    }

    /// Wraps an arbitrary writer, labelled with `target` in reports.
    #[must_use]
    pub fn from_writer(target: MergeTarget, output: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self { target, output }
    }

    /// Starts the writer task with one slot per URL, in URL order.
    ///
    /// The handle resolves to the total bytes written once every slot is
    /// finished or dropped, after the output has been flushed.
    #[must_use]
    pub fn spawn(self, count: usize, window: usize) -> (Vec<MergeSlot>, JoinHandle<io::Result<u64>>) {
        let mut slots = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for index in 0..count {
            let (tx, rx) = mpsc::channel(window.max(1));
            slots.push(MergeSlot {
                index,
                target: self.target.clone(),
                tx,
            });
            receivers.push(rx);
        }
        let handle = tokio::spawn(self.drain(receivers));
        (slots, handle)
    }

    async fn drain(self, receivers: Vec<mpsc::Receiver<MergeFrame>>) -> io::Result<u64> {
        let mut output = BufWriter::new(self.output);
        let mut total: u64 = 0;
        // First write error; every later URL is refused with the same failure.
        let mut failed: Option<(io::ErrorKind, String)> = None;

        for (index, mut rx) in receivers.into_iter().enumerate() {
            let mut written: u64 = 0;
            while let Some(frame) = rx.recv().await {
                match frame {
                    MergeFrame::Chunk(chunk) => {
                        if failed.is_some() {
                            continue;
                        }
                        match output.write_all(&chunk).await {
                            Ok(()) => written += chunk.len() as u64,
                            Err(e) => {
                                warn!(index, error = %e, "merged output write failed");
                                failed = Some((e.kind(), e.to_string()));
                            }
                        }
                    }
                    MergeFrame::Finish(ack) => {
                        if failed.is_none()
                            && let Err(e) = output.flush().await
                        {
                            failed = Some((e.kind(), e.to_string()));
                        }
                        let result = match &failed {
                            Some((kind, msg)) => Err(io::Error::new(*kind, msg.clone())),
                            None => Ok(written),
                        };
                        let _ = ack.send(result);
                        break;
                    }
                }
            }
            debug!(index, written, "merged slot drained");
            total += written;
        }

        if let Some((kind, msg)) = failed {
            return Err(io::Error::new(kind, msg));
        }
        output.flush().await?;
        output.shutdown().await?;
        Ok(total)
    }
}

/// Chooses the sink for each download according to the output mode.
#[derive(Debug)]
pub enum OutputRouter {
    /// One file per URL in the registry's directory.
    PerFile(NameRegistry),
    /// The merged target; slots are pre-assigned to tasks.
    Merged(MergeTarget),
}

impl OutputRouter {
    /// Opens the sink for `task`'s response.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be created or the
    /// task's merge slot is missing.
    pub async fn sink_for(
        &self,
        task: &mut DownloadTask,
        response_name: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Sink, DownloadError> {
        match self {
            Self::PerFile(registry) => {
                let name = derive_filename(&task.url, response_name, content_type);
                let (path, file) = registry
                    .create(&name)
                    .await
                    .map_err(|e| DownloadError::io(registry.directory().join(&name), e))?;
                Ok(Sink::File(FileSink::new(path, file)))
            }
            Self::Merged(target) => task.merge_slot.take().map(Sink::Merged).ok_or_else(|| {
                DownloadError::io(
                    target.to_string(),
                    io::Error::other("merged output slot already used"),
                )
            }),
        }
    }
}
