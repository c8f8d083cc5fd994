mod export;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use harvest_browser::{ChromeProcess, LaunchOptions};
use harvest_core::{
    ChromeContexts, CollectOutcome, CollectStatus, CollectorSettings, IncrementalCollector,
    NavigationWalk, PartialReason, RunLog, SessionManager, TotalTarget, TracingRunLog,
};
use harvest_types::HarvestConfig;

/// Harvest -- log in once, then collect every card from an infinite-scroll listing.
#[derive(Parser, Debug)]
#[command(name = "harvest", version, about)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(long, env = "HARVEST_CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Ignore any stored session and log in again
    #[arg(long)]
    force_login: bool,

    /// Where to write the JSON records (overrides `output_file`)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // First, so `.env` can supply RUST_LOG and HARVEST_CONFIG.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
    }

    let cli = Cli::parse();
    tracing::debug!(config = %cli.config.display(), "reading configuration");

    let mut config = HarvestConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if let Some(output) = cli.output {
        config.output_file = output;
    }
    if cli.headless {
        config.browser.headless = true;
    }

    let log = Arc::new(TracingRunLog::new());
    tracing::info!(run_id = %log.run_id(), config = %cli.config.display(), "starting harvest run");

    let chrome = ChromeProcess::launch(&launch_options(&config))
        .await
        .context("failed to start Chrome")?;
    let result = harvest(&chrome, &config, cli.force_login, log.clone()).await;
    chrome.close().await;
    let outcome = result?;

    export::write_records(&config.output_file, &outcome.records)?;
    report(&outcome, &config, log.as_ref());
    Ok(())
}

fn launch_options(config: &HarvestConfig) -> LaunchOptions {
    let browser = &config.browser;
    LaunchOptions {
        chrome_path: browser.chrome_path.clone(),
        headless: browser.headless,
        debug_port: browser.debug_port,
        user_data_dir: browser.user_data_dir.clone(),
        launch_timeout: browser.launch_timeout(),
        ..LaunchOptions::default()
    }
}

/// Acquire a session, walk to the listing, and collect it.
async fn harvest(
    chrome: &ChromeProcess,
    config: &HarvestConfig,
    force_login: bool,
    log: Arc<TracingRunLog>,
) -> anyhow::Result<CollectOutcome> {
    let contexts = ChromeContexts::new(chrome, config.timing.poll_interval());
    let manager = SessionManager::from_config(contexts, config, log.clone())?;
    let (page, _artifact) = manager
        .acquire_session(force_login)
        .await
        .context("could not obtain an authenticated session")?;

    NavigationWalk::from_config(config, log.clone())
        .run(&page)
        .await
        .context("could not reach the listing")?;

    let outcome = IncrementalCollector::new(CollectorSettings::from_config(config), log)
        .collect(&page)
        .await
        .context("collection failed")?;
    Ok(outcome)
}

/// Print the one-line summary. A partial result is accepted with a warning.
fn report(outcome: &CollectOutcome, config: &HarvestConfig, log: &dyn RunLog) {
    let target = match outcome.target {
        TotalTarget::Announced(n) => format!("{n} announced"),
        TotalTarget::Fallback(n) => format!("{n} assumed"),
    };
    match outcome.status {
        CollectStatus::Complete => println!(
            "complete: {} records ({target}) written to {}",
            outcome.records.len(),
            config.output_file.display()
        ),
        CollectStatus::Partial {
            reason: PartialReason::Stagnated { rounds },
        } => {
            log.warn(&format!(
                "result is partial: listing stopped growing after {rounds} idle round(s)"
            ));
            println!(
                "partial: {} records ({target}) written to {}",
                outcome.records.len(),
                config.output_file.display()
            );
        }
    }
}
