//! Chronicle live ingestion daemon.
//!
//! This is the main entry point for the channel archiving service. It wires
//! the live listener (with album grouping), one backfill or catch-up walk per
//! configured channel, and the tiered stats refresher against a shared
//! SQLite post store.
//!
//! # Usage
//!
//! ```bash
//! # Run against a directory of JSONL channel dumps
//! chronicle-ingest --replay-dir ./dumps
//!
//! # Track a subset of the dumped channels with custom paths
//! chronicle-ingest \
//!     --replay-dir ./dumps \
//!     --channels durov,technews \
//!     --db-path /data/chronicle.db \
//!     --media-dir /data/media
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C): the refresher stops after its current
//! cycle, the grouper drops albums still buffering, and stats are summarized
//! on the way out.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chronicle_core::metrics::{init_metrics, start_metrics_server};
use chronicle_ingest::{
    BackfillConfig, ChannelClient, GrouperConfig, LocalMediaSink, MediaSink, NullMediaSink,
    PostStore, RefreshConfig, ReplayClient, StatsRefresher, Throttled, run_grouper, sync_channel,
};

/// Chronicle live ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "chronicle-ingest")]
#[command(about = "Broadcast-channel ingestion and sync daemon")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, default_value = "./data/chronicle.db")]
    db_path: PathBuf,

    /// Directory of JSONL channel dumps to serve as the platform feed
    #[arg(long)]
    replay_dir: PathBuf,

    /// Channel references to track (comma-separated; defaults to every dump)
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,

    /// Media output directory
    #[arg(long, default_value = "./media")]
    media_dir: PathBuf,

    /// Disable media placement
    #[arg(long)]
    no_media: bool,

    /// Backfill cutoff date (YYYY-MM-DD, UTC)
    #[arg(long, default_value = "2025-01-01")]
    cutoff: String,

    /// Album debounce delay in milliseconds
    #[arg(long, default_value = "2000")]
    debounce_ms: u64,

    /// Delay between platform requests in milliseconds
    #[arg(long, default_value = "1500")]
    request_delay_ms: u64,

    /// Messages per history page during backfill
    #[arg(long, default_value = "100")]
    page_size: usize,

    /// Stats refresh interval in seconds
    #[arg(long, default_value = "300")]
    refresh_interval_secs: u64,

    /// Hot refresh window in hours
    #[arg(long, default_value = "2")]
    hot_window_hours: i64,

    /// Warm refresh window in days
    #[arg(long, default_value = "2")]
    warm_window_days: i64,

    /// Refresh warm posts every Nth cycle
    #[arg(long, default_value = "3")]
    warm_every: u64,

    /// Posts per warm-tier update batch
    #[arg(long, default_value = "25")]
    update_batch_size: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("chronicle_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Chronicle ingestion daemon starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
        metrics::gauge!("ingest_running").set(1.0);
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let cutoff = NaiveDate::parse_from_str(&args.cutoff, "%Y-%m-%d")
        .with_context(|| format!("Invalid cutoff date '{}'", args.cutoff))?
        .and_time(NaiveTime::MIN)
        .and_utc();

    // No store, no service: abort immediately
    let store = Arc::new(
        PostStore::open(&args.db_path)
            .with_context(|| format!("Failed to open post store at {:?}", args.db_path))?,
    );

    let replay = ReplayClient::open(&args.replay_dir)
        .with_context(|| format!("Failed to load channel dumps from {:?}", args.replay_dir))?;

    let references = if args.channels.is_empty() {
        replay.references()
    } else {
        args.channels.clone()
    };
    if references.is_empty() {
        anyhow::bail!("No channels to track: pass --channels or provide dumps");
    }

    let request_delay = Duration::from_millis(args.request_delay_ms);
    let client: Arc<dyn ChannelClient> = Arc::new(Throttled::new(replay, request_delay));

    let media: Arc<dyn MediaSink> = if args.no_media {
        Arc::new(NullMediaSink)
    } else {
        Arc::new(LocalMediaSink::new(&args.media_dir))
    };

    tracing::info!("Configuration:");
    tracing::info!("  Database: {}", args.db_path.display());
    tracing::info!("  Dumps: {}", args.replay_dir.display());
    tracing::info!("  Channels: {}", references.join(", "));
    tracing::info!("  Cutoff: {}", cutoff);
    tracing::info!("  Request delay: {:?}", request_delay);
    tracing::info!(
        "  Media: {}",
        if args.no_media {
            "disabled".to_string()
        } else {
            args.media_dir.display().to_string()
        }
    );

    // Resolve the channel set for the live subscription. A channel that
    // fails to resolve is skipped for this run and stays unsynced.
    let mut channel_ids = Vec::new();
    for reference in &references {
        match client.resolve_channel(reference).await {
            Ok(channel) => channel_ids.push(channel.id),
            Err(e) => tracing::error!("Skipping channel '{}': {}", reference, e),
        }
    }

    let backfill_config = BackfillConfig {
        cutoff,
        page_size: args.page_size,
    };

    // One backfill or catch-up walk per channel, run once at startup. A
    // failed walk only affects its own channel.
    let mut sync_tasks = Vec::new();
    for reference in references.clone() {
        let client = Arc::clone(&client);
        let store = Arc::clone(&store);
        let media = Arc::clone(&media);
        let config = backfill_config.clone();
        sync_tasks.push(tokio::spawn(async move {
            if let Err(e) = sync_channel(
                client.as_ref(),
                store.as_ref(),
                media.as_ref(),
                &reference,
                &config,
            )
            .await
            {
                tracing::error!("Sync failed for '{}': {}", reference, e);
            }
        }));
    }

    // Live listener with album grouping
    let live = client
        .subscribe(&channel_ids)
        .await
        .context("Failed to subscribe to the live feed")?;
    let grouper_task = tokio::spawn(run_grouper(
        live,
        Arc::clone(&store),
        Arc::clone(&media),
        GrouperConfig {
            debounce: Duration::from_millis(args.debounce_ms),
        },
        Arc::clone(&running),
    ));

    // Tiered stats refresher
    let refresher = StatsRefresher::new(
        Arc::clone(&client),
        Arc::clone(&store),
        RefreshConfig {
            interval: Duration::from_secs(args.refresh_interval_secs),
            hot_window: TimeDelta::hours(args.hot_window_hours),
            warm_window: TimeDelta::days(args.warm_window_days),
            warm_every: args.warm_every,
            batch_size: args.update_batch_size,
        },
    );
    let refresher_running = Arc::clone(&running);
    let refresher_task = tokio::spawn(async move {
        refresher.run(refresher_running).await;
    });

    tracing::info!("Running {} tasks in parallel...", sync_tasks.len() + 2);

    for task in sync_tasks {
        let _ = task.await;
    }
    let grouper_stats = grouper_task.await.unwrap_or_default();
    let _ = refresher_task.await;

    // Mark as stopped
    metrics::gauge!("ingest_running").set(0.0);

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Live singles:      {}", grouper_stats.singles);
    tracing::info!("Live albums:       {}", grouper_stats.albums);
    tracing::info!("Live posts saved:  {}", grouper_stats.saved);
    tracing::info!("Live duplicates:   {}", grouper_stats.duplicates);
    tracing::info!("Posts stored:      {}", store.post_count().unwrap_or(0));

    Ok(())
}
