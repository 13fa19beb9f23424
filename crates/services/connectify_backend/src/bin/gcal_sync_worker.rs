//! Command line queue worker for calendar sync.
//!
//! Runs one batch and exits by default, or polls like the in-server worker with `--loop`.

use clap::Parser;
use connectify_backend::app_state::AppState;
use connectify_backend::background::{self, TickOptions};
use connectify_common::logging;
use connectify_config::load_config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Process the Google Calendar sync queue.
#[derive(Parser, Debug)]
#[command(name = "gcal_sync_worker", version, about, long_about = None)]
struct Cli {
    /// Process one batch and exit (default).
    #[arg(long, conflicts_with = "poll")]
    once: bool,

    /// Keep polling every `worker.poll_interval_secs` until interrupted.
    #[arg(long = "loop")]
    poll: bool,

    /// Only process items of this specialist.
    #[arg(long, value_name = "ID")]
    specialist: Option<i64>,

    /// Maximum number of items per batch; defaults to `worker.batch_size`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_items: Option<u32>,

    /// Return stale `processing` items to `pending` before each batch.
    #[arg(long)]
    reap: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("Failed to load config: {}", err);
            std::process::exit(1);
        }
    };
    let _log_guard = logging::init(&config.logging);

    let state = match AppState::initialize(config.clone()).await {
        Ok(state) => state,
        Err(err) => {
            error!("Calendar sync could not be initialized: {}", err);
            std::process::exit(1);
        }
    };

    let options = TickOptions {
        max_items: cli.max_items.unwrap_or(config.worker.batch_size),
        specialist_id: cli.specialist,
        reap: cli.reap,
    };

    if cli.poll && !cli.once {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = background::spawn(
            state.gcal_sync.clone(),
            options,
            Duration::from_secs(config.worker.poll_interval_secs.max(1)),
            shutdown_rx,
        );
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", err);
        }
        let _ = shutdown_tx.send(true);
        if let Err(err) = worker.await {
            error!("Queue worker ended abnormally: {}", err);
            std::process::exit(1);
        }
        return;
    }

    match background::run_tick(&state.gcal_sync, options).await {
        Ok(summary) => {
            info!(
                "Queue run done: processed={} succeeded={} failed={} requeued={}",
                summary.processed, summary.succeeded, summary.failed, summary.requeued
            );
        }
        Err(err) => {
            error!("Queue run failed: {}", err);
            std::process::exit(1);
        }
    }
}
