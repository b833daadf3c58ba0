//! `stack-scout`: find dependency manifests in a hosted repository and submit
//! them to a stack-analysis service.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and initialise logging ([`logging`]).
//! 2. Load config ([`config::load_config`]).
//! 3. Optionally inspect a container image for its base OS and origin
//!    repository ([`image`]).
//! 4. Resolve the repository tree, filter manifests, fetch and dispatch them
//!    concurrently ([`pipeline`]).
//! 5. Render the requested report ([`report`]).
//! 6. Exit `0` (clean), `1` (any failed manifest or unresolvable repository)
//!    or `130` (interrupted).

mod analysis;
mod cli;
mod config;
mod detector;
mod error;
mod github;
mod image;
mod logging;
mod models;
mod pipeline;
mod report;
mod scanner;
#[cfg(test)]
mod testing;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use analysis::StackAnalysisClient;
use cli::{Cli, ReportFormat};
use config::load_config;
use detector::ManifestFilter;
use github::fetch::RawContentFetcher;
use github::tree::GithubTreeResolver;
use image::{DockerImageInspector, ImageInspector};
use models::{PipelineResult, RunStatus};
use pipeline::ManifestPipeline;
use scanner::Scanner;
use transport::HttpTransport;

const EXIT_FAILURES: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose)?;

    let cwd = std::env::current_dir().context("failed to determine working directory")?;
    let config = load_config(&cwd, cli.config.as_deref())?;

    let transport = HttpTransport::new(&config.http).context("failed to build HTTP client")?;

    let resolver = GithubTreeResolver::new(
        transport.clone(),
        &config.github.api_base,
        &config.github.default_branch,
        config.github.token.clone(),
    );
    let filter = ManifestFilter::new(
        config.manifests.recognized.clone(),
        &config.github.raw_base,
        &config.github.default_branch,
    );
    let fetcher = RawContentFetcher::new(transport.clone());
    let dispatcher = StackAnalysisClient::new(transport, &config.analysis.base_url);
    info!(endpoint = dispatcher.endpoint(), "stack analysis endpoint");

    let pipeline = ManifestPipeline::new(
        Arc::new(resolver),
        filter,
        Arc::new(fetcher),
        Arc::new(dispatcher),
        config.analysis.token.clone(),
        config.pipeline.max_in_flight,
    );

    let request = cli.scan_request();
    let inspector: Option<Arc<dyn ImageInspector>> = match &request.image {
        Some(_) => match DockerImageInspector::connect_local() {
            Ok(inspector) => Some(Arc::new(inspector)),
            Err(e) => {
                warn!(error = %e, "could not connect to Docker, image will not be inspected");
                None
            }
        },
        None => None,
    };
    let scanner = Scanner::new(inspector, pipeline);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let spinner = if !cli.quiet && cli.report == ReportFormat::Terminal {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.set_message("scanning");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let result = scanner.scan(&request, &cancel).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match cli.report {
        ReportFormat::Terminal => report::terminal::render(&result, cli.verbose, cli.quiet)?,
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    let code = exit_code(&result);
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

fn exit_code(result: &PipelineResult) -> i32 {
    if result.status == RunStatus::Cancelled {
        EXIT_INTERRUPTED
    } else if result.failure_count() > 0 || result.repository_error.is_some() {
        EXIT_FAILURES
    } else {
        0
    }
}
