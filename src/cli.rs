//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use pget_core::{
    Config, Credentials, DEFAULT_CONCURRENCY, DEFAULT_MAX_REDIRECTS, MergeTarget, OutputMode,
    UrlSource, default_user_agent,
};

/// Concurrent HTTP GET downloader.
///
/// Downloads every URL given on the command line (and in an optional list
/// file), several at a time, into one file per URL or into a single merged
/// output that keeps the input order.
#[derive(Parser, Debug)]
#[command(name = "pget")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Read URLs from FILE, `-` for stdin, or an http(s) URL (one per line)
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input_file: Option<String>,

    /// Write all downloads, concatenated in input order, to FILE (`-` for stdout)
    #[arg(short = 'O', long, value_name = "FILE")]
    pub output_document: Option<String>,

    /// Save files into DIR (created if missing)
    #[arg(short = 'P', long, value_name = "DIR", default_value = ".")]
    pub directory_prefix: PathBuf,

    /// Maximum redirects followed per URL
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_REDIRECTS)]
    pub max_redirect: u32,

    /// User-Agent header to send
    #[arg(short = 'U', long, value_name = "AGENT")]
    pub user_agent: Option<String>,

    /// Basic-auth user (requires --password)
    #[arg(long, requires = "password")]
    pub user: Option<String>,

    /// Basic-auth password (requires --user)
    #[arg(long, requires = "user")]
    pub password: Option<String>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Cancel downloads still running after SECS seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Connect timeout per request in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout: u64,

    /// Idle timeout in seconds for any single read of headers or body
    #[arg(long, value_name = "SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout: u64,

    /// Increase output verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress progress and result lines
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Default tracing filter when `RUST_LOG` is unset.
    ///
    /// Priority: quiet > debug > verbose count > `warn`.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.debug {
            "debug"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// The `-i` source, if one was given.
    #[must_use]
    pub fn url_source(&self) -> Option<UrlSource> {
        self.input_file.as_deref().map(UrlSource::from_arg)
    }

    /// Builds the immutable run configuration for `urls`.
    #[must_use]
    pub fn into_config(self, urls: Vec<Url>) -> Config {
        let output_mode = match self.output_document.as_deref() {
            Some(target) => OutputMode::Merged(MergeTarget::from_arg(target)),
            None => OutputMode::PerFile {
                directory: self.directory_prefix,
            },
        };
        let mut config = Config::new(urls)
            .with_output_mode(output_mode)
            .with_max_redirects(self.max_redirect)
            .with_concurrency(usize::from(self.concurrency))
            .with_quiet(self.quiet)
            .with_user_agent(self.user_agent.unwrap_or_else(default_user_agent))
            .with_timeouts(
                Duration::from_secs(self.connect_timeout),
                Duration::from_secs(self.read_timeout),
            )
            .with_deadline(self.timeout.map(Duration::from_secs));
        if let (Some(user), Some(password)) = (self.user, self.password) {
            config = config.with_credentials(Credentials::new(user, password));
        }
        config
    }
}
