//! CLI entry point for pget.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pget_core::download::RequestTemplate;
use pget_core::{DownloadEngine, ExitStatus, HttpClient, Reporter, load_urls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(args.log_level());
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("pget: {e:#}");
            ExitCode::from(ExitStatus::Fatal.code())
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the flag-derived level.
fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

async fn run(args: Args) -> Result<ExitStatus> {
    let source = args.url_source();
    let positional = args.urls.clone();
    let mut config = args.into_config(Vec::new());
    config.validate().context("invalid configuration")?;

    let client = HttpClient::with_timeouts(config.connect_timeout, config.read_timeout)
        .context("failed to build HTTP client")?;
    let template = RequestTemplate::from_config(&config).context("invalid request headers")?;

    config.urls = load_urls(
        &positional,
        source.as_ref(),
        &client,
        &template,
        config.max_redirects,
    )
    .await
    .context("failed to load URLs")?;

    if config.urls.is_empty() {
        if !config.quiet {
            eprintln!("pget: no URLs given");
            eprintln!("Usage: pget [OPTIONS] [URL]...   (try 'pget --help')");
        }
        return Ok(ExitStatus::Success);
    }
    info!(urls = config.urls.len(), "starting pget");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling downloads");
            interrupt.cancel();
        }
    });

    let show_progress = io::stderr().is_terminal() && !config.quiet && !is_dumb_terminal();
    let reporter = Arc::new(Reporter::new(config.urls.len(), config.quiet, show_progress));

    let engine = DownloadEngine::new().with_observer(reporter.clone());
    let outcomes = engine
        .run(&config, &client, cancel)
        .await
        .context("cannot start downloads")?;

    reporter.finish(&outcomes);
    Ok(ExitStatus::from_outcomes(&outcomes))
}
