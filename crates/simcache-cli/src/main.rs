//! simcache - command line driver for the offline cache agent.
//!
//! Each subcommand activates a fresh agent context over the configured data
//! directory, so the stores and ledger it touches are the same ones a
//! long-running agent would use.

mod cli;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use simcache_core::utils::resolve;
use simcache_core::{
    Agent, AgentConfig, AgentContext, ClientMessage, HttpNetwork, MatchOptions, Phase,
};

use cli::{CliArgs, Command};

/// File name prefix for the daily log files
const LOG_FILE_PREFIX: &str = "simcache.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to a daily rolling file when a log
/// directory is configured. The returned guard must live until exit.
fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default = if verbose { "simcache=debug" } else { "simcache=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let mut config = AgentConfig::load().context("Failed to load configuration")?;
    if let Some(origin) = args.origin {
        config.origin = origin;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }

    let _guard = init_tracing(args.verbose, config.log_dir.as_deref());
    info!(origin = %config.origin, "simcache starting");

    let network = Arc::new(
        HttpNetwork::new(config.request_timeout()).context("Failed to build HTTP client")?,
    );
    let ctx = AgentContext::activate(config, network)
        .await
        .context("Failed to activate agent")?;

    match args.command {
        Command::Start => start(&ctx).await,
        Command::Prefetch { codes } => prefetch(ctx, codes).await,
        Command::Fetch { url } => fetch(ctx, &url).await,
        Command::Status => status(&ctx).await,
    }
}

async fn start(ctx: &AgentContext) -> Result<()> {
    let report = ctx.initialize().await?;

    println!("phase:      {:?}", ctx.phase());
    println!("generation: {}", report.generation_id);
    if !report.deleted_stores.is_empty() {
        println!("removed:    {}", report.deleted_stores.join(", "));
    }
    println!("baseline:   {} file(s) added", report.baseline_added);
    if let Some(rehydrated) = &report.rehydrated {
        println!(
            "restored:   {} ({} file(s))",
            rehydrated.cached_locations.join(", "),
            rehydrated.files_written
        );
    }
    for failure in &report.failures {
        eprintln!("warning:    {}", failure);
    }
    println!("stores:     {}", ctx.storage().keys().await?.join(", "));
    Ok(())
}

async fn prefetch(ctx: Arc<AgentContext>, codes: Vec<String>) -> Result<()> {
    let (agent, _task) = Agent::spawn(ctx);
    let mut client = agent.connect().await;

    let reply = client.request(ClientMessage::cache_images(codes)).await?;
    println!("{}", reply.to_json()?);
    Ok(())
}

async fn fetch(ctx: Arc<AgentContext>, target: &str) -> Result<()> {
    let url = resolve(ctx.origin(), target)
        .with_context(|| format!("Invalid URL: {}", target))?;
    let (agent, _task) = Agent::spawn(ctx);
    if agent.wait_until_settled().await == Phase::Failed {
        eprintln!("warning: agent failed to initialize, serving from existing stores");
    }

    let result = agent.fetch(url.clone()).await?;
    println!(
        "{} {} {:?} ({} bytes)",
        result.response.status,
        url,
        result.outcome,
        result.response.body.len()
    );
    Ok(())
}

async fn status(ctx: &AgentContext) -> Result<()> {
    let storage = ctx.storage();
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No stores");
    }
    for name in &names {
        let store = storage.open(name).await?;
        println!("{:<24} {} entries", name, store.keys().await?.len());
    }

    let manifest_url = ctx.config().manifest_url()?;
    let cached_manifest = storage
        .match_url(&manifest_url, MatchOptions::exact(), Some(&ctx.config().manifest_store_name))
        .await?
        .is_some();
    println!("manifest copy: {}", if cached_manifest { "present" } else { "absent" });

    match ctx.ledger() {
        Ok(ledger) => match ledger.load().await? {
            Some(codes) => println!("selection: {}", codes.join(", ")),
            None => println!("selection: none"),
        },
        Err(e) => println!("selection: {}", e),
    }
    Ok(())
}
