//! # adwatch
//!
//! Terminal watcher for the adwatch classifieds feed.
//!
//! ## Example
//!
//! ```bash
//! # Watch with defaults
//! adwatch
//!
//! # Custom endpoints and an audible ping for new listings
//! adwatch --config adwatch.toml --sound
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use feed_client::{
    EngineConfig, EngineSnapshot, FeedEngine, FileStore, HttpFetcher, RodioPlayer, WsTransport,
};

/// Terminal watcher for the adwatch classifieds feed.
#[derive(Parser, Debug)]
#[command(name = "adwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Play the notification sound when new listings arrive
    #[arg(long)]
    sound: bool,

    /// Start with an empty window instead of the persisted snapshot
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let fetcher = HttpFetcher::new(&config.feed.fallback_url);
    let store = Arc::new(FileStore::new(&config.snapshot.path, config.snapshot.ttl()));
    let engine = Arc::new(FeedEngine::new(
        config,
        WsTransport::new(),
        fetcher,
        store,
        Arc::new(RodioPlayer::spawn()),
    ));

    if !cli.fresh {
        engine.restore_saved().await;
    }

    if cli.sound {
        // Sound is a convenience; a missing output device or unreachable
        // sound URL must not stop the watcher
        if let Err(e) = engine.enable_sound().await {
            warn!(error = %e, "sound disabled");
        }
    }

    let runner = Arc::clone(&engine);
    let run_task = tokio::spawn(async move { runner.run().await });

    render_until_interrupted(&engine).await?;

    engine.shutdown();
    run_task.await.context("engine task panicked")?;

    Ok(())
}

/// Redraw the window whenever it changes, until Ctrl-C.
async fn render_until_interrupted(
    engine: &FeedEngine<WsTransport, HttpFetcher>,
) -> Result<()> {
    let mut last_render = String::new();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = ticker.tick() => {
                let rendered = render(&engine.snapshot().await);
                if rendered != last_render {
                    println!("{rendered}");
                    last_render = rendered;
                }
            }
        }
    }
}

fn render(snapshot: &EngineSnapshot) -> String {
    let mut out = String::new();

    if snapshot.loading {
        out.push_str("loading...\n");
    }
    if let Some(error) = &snapshot.error {
        out.push_str(&format!("! {error}\n"));
    }

    for listing in &snapshot.listings {
        out.push_str(&format!(
            "{:>10}  {:<40} {:>12}  {}\n",
            listing.id, listing.title, listing.price, listing.location
        ));
    }

    out
}
