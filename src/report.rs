//! Per-outcome progress lines, the final summary and the process exit code.
//!
//! Everything goes to standard error so that merged output on standard output
//! carries nothing but body bytes.

use indicatif::{ProgressBar, ProgressStyle};

use crate::download::{ErrorKind, Outcome, OutcomeObserver};

/// Process exit status for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every URL succeeded (or there were none).
    Success,
    /// The run was cancelled.
    Cancelled,
    /// Input, configuration or output setup failed before scheduling.
    Fatal,
    /// File output failed.
    Io,
    /// Connection-level failure.
    Network,
    /// Redirect protocol failure.
    Protocol,
    /// The server answered with an error status.
    ServerError,
}

impl ExitStatus {
    /// Maps a task failure kind to its exit status.
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::Io | ErrorKind::PartialWrite => Self::Io,
            ErrorKind::Network => Self::Network,
            ErrorKind::TooManyRedirects | ErrorKind::InvalidRedirect => Self::Protocol,
            ErrorKind::HttpStatus(_) => Self::ServerError,
        }
    }

    /// Derives the status of a run: the first failed URL in input order wins.
    #[must_use]
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .min_by_key(|outcome| outcome.index)
            .and_then(Outcome::error_kind)
            .map_or(Self::Success, Self::from_kind)
    }

    /// Numeric process exit code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Cancelled => 1,
            Self::Fatal => 2,
            Self::Io => 3,
            Self::Network => 4,
            Self::Protocol => 7,
            Self::ServerError => 8,
        }
    }
}

/// Exit code for a finished run: `0` only if every outcome succeeded.
#[must_use]
pub fn exit_code(outcomes: &[Outcome]) -> u8 {
    ExitStatus::from_outcomes(outcomes).code()
}

/// One report line for an outcome.
///
/// `download: URL to PATH (N bytes)` on success (without ` to PATH` when the
/// body went to standard output), `download failed: URL: ERROR` otherwise.
#[must_use]
pub fn format_outcome_line(outcome: &Outcome) -> String {
    if outcome.is_success() {
        match &outcome.destination {
            Some(destination) if !destination.is_stdout() => format!(
                "download: {} to {} ({} bytes)",
                outcome.url, destination, outcome.byte_count
            ),
            _ => format!("download: {} ({} bytes)", outcome.url, outcome.byte_count),
        }
    } else {
        let error = outcome
            .error
            .clone()
            .or_else(|| outcome.error_kind().map(|kind| kind.to_string()))
            .unwrap_or_default();
        format!("download failed: {}: {error}", outcome.url)
    }
}

/// Final summary, or `None` when every download succeeded.
#[must_use]
pub fn format_summary(outcomes: &[Outcome]) -> Option<String> {
    let failed: Vec<&Outcome> = outcomes.iter().filter(|o| !o.is_success()).collect();
    if failed.is_empty() {
        return None;
    }
    let mut summary = format!(
        "{} of {} downloads failed:",
        failed.len(),
        outcomes.len()
    );
    for outcome in failed {
        let kind = outcome
            .error_kind()
            .map(|kind| kind.to_string())
            .unwrap_or_default();
        summary.push_str(&format!("\n  {} ({kind})", outcome.url));
    }
    Some(summary)
}

/// Prints outcomes to standard error as they arrive.
///
/// Shows a progress bar when standard error is a terminal; the bar is
/// suspended while each line is printed so the two never interleave.
#[derive(Debug)]
pub struct Reporter {
    quiet: bool,
    bar: ProgressBar,
}

impl Reporter {
    /// Creates a reporter for `total` URLs.
    ///
    /// `show_progress` draws a bar; otherwise only lines are printed.
    #[must_use]
    pub fn new(total: usize, quiet: bool, show_progress: bool) -> Self {
        let bar = if show_progress && !quiet {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { quiet, bar }
    }

    /// Clears the bar and prints the summary of failed URLs.
    pub fn finish(&self, outcomes: &[Outcome]) {
        self.bar.finish_and_clear();
        if self.quiet {
            return;
        }
        if let Some(summary) = format_summary(outcomes) {
            eprintln!("{summary}");
        }
    }
}

impl OutcomeObserver for Reporter {
    fn on_outcome(&self, outcome: &Outcome) {
        self.bar.inc(1);
        if self.quiet {
            return;
        }
        let line = format_outcome_line(outcome);
        self.bar.suspend(|| eprintln!("{line}"));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::config::MergeTarget;
    use crate::download::{Destination, DownloadError, TaskState};

    fn succeeded(index: usize, url: &str, destination: Destination, bytes: u64) -> Outcome {
        Outcome {
            index,
            url: Url::parse(url).unwrap(),
            state: TaskState::Succeeded {
                bytes_written: bytes,
            },
            http_status: Some(200),
            byte_count: bytes,
            elapsed: Duration::from_millis(5),
            final_url: None,
            redirect_chain: Vec::new(),
            destination: Some(destination),
            error: None,
        }
    }

    fn failed(index: usize, url: &str, error: &DownloadError) -> Outcome {
        Outcome::not_started(index, Url::parse(url).unwrap(), error)
    }

    #[test]
    fn test_format_outcome_line_success_to_file() {
        let outcome = succeeded(
            0,
            "https://example.com/a.bin",
            Destination::File(PathBuf::from("out/a.bin")),
            42,
        );
        assert_eq!(
            format_outcome_line(&outcome),
            "download: https://example.com/a.bin to out/a.bin (42 bytes)"
        );
    }

    #[test]
    fn test_format_outcome_line_success_to_stdout_omits_destination() {
        let outcome = succeeded(
            0,
            "https://example.com/a.bin",
            Destination::Merged(MergeTarget::Stdout),
            7,
        );
        assert_eq!(
            format_outcome_line(&outcome),
            "download: https://example.com/a.bin (7 bytes)"
        );
    }

    #[test]
    fn test_format_outcome_line_failure() {
        let error = DownloadError::http_status("https://example.com/x", 404);
        let outcome = failed(0, "https://example.com/x", &error);
        let line = format_outcome_line(&outcome);
        assert!(line.starts_with("download failed: https://example.com/x: "), "got: {line}");
        assert!(line.contains("404"), "got: {line}");
    }

    #[test]
    fn test_exit_code_zero_when_all_succeed_or_empty() {
        assert_eq!(exit_code(&[]), 0);
        let outcome = succeeded(
            0,
            "https://example.com/a",
            Destination::File(PathBuf::from("a")),
            1,
        );
        assert_eq!(exit_code(&[outcome]), 0);
    }

    #[test]
    fn test_exit_code_first_failed_url_in_input_order_wins() {
        let network = DownloadError::timeout("https://example.com/b");
        let http = DownloadError::http_status("https://example.com/c", 500);
        let outcomes = vec![
            failed(2, "https://example.com/c", &http),
            succeeded(
                0,
                "https://example.com/a",
                Destination::File(PathBuf::from("a")),
                1,
            ),
            failed(1, "https://example.com/b", &network),
        ];
        assert_eq!(exit_code(&outcomes), 4);
    }

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(ExitStatus::from_kind(ErrorKind::Cancelled).code(), 1);
        assert_eq!(ExitStatus::Fatal.code(), 2);
        assert_eq!(ExitStatus::from_kind(ErrorKind::PartialWrite).code(), 3);
        assert_eq!(ExitStatus::from_kind(ErrorKind::InvalidRedirect).code(), 7);
        assert_eq!(ExitStatus::from_kind(ErrorKind::HttpStatus(404)).code(), 8);
        for kind in [
            ErrorKind::Network,
            ErrorKind::TooManyRedirects,
            ErrorKind::Io,
            ErrorKind::HttpStatus(503),
        ] {
            assert_eq!(ExitStatus::from_kind(kind).code(), kind.exit_code());
        }
    }

    #[test]
    fn test_format_summary_lists_failed_urls() {
        let error = DownloadError::cancelled("https://example.com/b");
        let outcomes = vec![
            succeeded(
                0,
                "https://example.com/a",
                Destination::File(PathBuf::from("a")),
                1,
            ),
            failed(1, "https://example.com/b", &error),
        ];
        let summary = format_summary(&outcomes).unwrap();
        assert!(summary.starts_with("1 of 2 downloads failed:"), "got: {summary}");
        assert!(summary.contains("https://example.com/b (cancelled)"));
        assert!(!summary.contains("https://example.com/a"));
        assert!(format_summary(&outcomes[..1]).is_none());
    }

    #[test]
    fn test_quiet_reporter_accepts_outcomes_silently() {
        let reporter = Reporter::new(1, true, true);
        let outcome = succeeded(
            0,
            "https://example.com/a",
            Destination::File(PathBuf::from("a")),
            1,
        );
        reporter.on_outcome(&outcome);
        reporter.finish(&[outcome]);
    }
}
