//! Sitefold main entry point
//!
//! This is the command-line interface for the sitefold website mirror.

use clap::Parser;
use sitefold::config::{MirrorConfig, DEFAULT_USER_AGENT};
use sitefold::crawler::{
    build_http_client, CrawlOutcome, Fetcher, HeadlessChromeRenderer, RetryPolicy, Scheduler,
};
use sitefold::CrawlSession;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Sitefold: a website mirroring tool
///
/// Sitefold downloads a page together with the stylesheets, scripts and
/// images it references, rewrites those references for offline browsing,
/// and can optionally crawl further same-domain pages up to a page limit.
#[derive(Parser, Debug)]
#[command(name = "sitefold")]
#[command(version = "0.1.0")]
#[command(about = "Mirror a website for offline browsing", long_about = None)]
struct Cli {
    /// URL of the page to mirror
    #[arg(value_name = "URL")]
    url: String,

    /// Directory to write the mirrored site into
    #[arg(short, long, default_value = "downloaded_site")]
    output: PathBuf,

    /// Delay between requests, in seconds
    #[arg(short, long, default_value_t = 0.5)]
    delay: f64,

    /// Seconds to let a dynamically rendered page settle
    #[arg(short, long, default_value_t = 2.0)]
    wait: f64,

    /// Follow same-domain links instead of mirroring a single page
    #[arg(short, long)]
    crawl: bool,

    /// Maximum number of pages to mirror in crawl mode
    #[arg(short, long, default_value_t = 10)]
    max_pages: usize,

    /// User-Agent header sent with every request
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Number of concurrent download workers
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Path to a headless Chrome/Chromium binary; enables dynamic
    /// rendering as a fallback for pages that fail a static fetch
    #[arg(long, value_name = "BINARY")]
    render_with: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;
    tracing::info!(
        "mirroring {} into {}",
        config.start_url,
        config.output_root.display()
    );
    if config.crawl {
        tracing::info!(
            "crawl mode: up to {} pages, {} workers",
            config.max_pages,
            config.workers
        );
    }

    let fetcher = build_fetcher(&cli, &config)?;
    let session = Arc::new(CrawlSession::new(config)?);
    let scheduler = Scheduler::new(Arc::clone(&session), fetcher)?;

    // Ctrl-C finishes in-flight pages and writes the manifest for what
    // was mirrored so far.
    let interrupt_session = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight pages");
            interrupt_session.request_stop();
        }
    });

    match scheduler.run().await {
        Ok(CrawlOutcome::Drained) => {
            tracing::info!("mirror complete: no more pages to fetch");
        }
        Ok(CrawlOutcome::CeilingReached) => {
            tracing::info!("mirror complete: page limit reached");
        }
        Err(e) => {
            tracing::error!("mirror failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitefold=info,warn"),
            1 => EnvFilter::new("sitefold=debug,info"),
            2 => EnvFilter::new("sitefold=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Translates CLI arguments into a validated crawl configuration.
fn build_config(cli: &Cli) -> anyhow::Result<MirrorConfig> {
    let mut config = MirrorConfig::new(&cli.url, cli.output.clone())?;
    config.delay = Duration::from_secs_f64(cli.delay.max(0.0));
    config.render_wait = Duration::from_secs_f64(cli.wait.max(0.0));
    config.crawl = cli.crawl;
    config.max_pages = cli.max_pages;
    config.workers = cli.workers;
    config.user_agent = cli.user_agent.clone();
    config.validate()?;
    Ok(config)
}

/// Builds the fetcher, wiring in the headless renderer when one was
/// requested on the command line.
fn build_fetcher(cli: &Cli, config: &MirrorConfig) -> anyhow::Result<Fetcher> {
    let client = build_http_client(&config.user_agent, config.request_timeout)?;
    let retry = RetryPolicy::new(config.delay);
    let mut fetcher = Fetcher::new(client, retry, config.user_agent.clone());

    if let Some(binary) = &cli.render_with {
        tracing::info!("dynamic rendering enabled via {}", binary.display());
        let renderer = HeadlessChromeRenderer::new(binary.clone());
        fetcher = fetcher.with_renderer(Arc::new(renderer), config.render_wait);
    }

    Ok(fetcher)
}
