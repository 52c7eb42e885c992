use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use shared::domain::UserId;
use storage::Storage;
use sync_core::{
    Channel, DirCloudStore, EventApplier, PushChannel, ReconciliationChannel,
    ReconciliationScheduler,
};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod receiver;

use config::{load_settings, prepare_database_url};
use receiver::run_push_receiver;

/// Primary-device daemon: applies events arriving over push and
/// reconciliation to the local SQLite store.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `local_app.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Arc::new(
        Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open local store at '{database_url}'"))?,
    );
    storage.health_check().await?;

    let owner = UserId(settings.owner_user_id);
    info!(
        user_id = owner.0,
        %database_url,
        cloud_dir = %settings.cloud_dir.display(),
        relay_url = settings.relay_url.as_deref().unwrap_or("-"),
        "sync: local app starting"
    );

    let (delivery_tx, delivery_rx) = mpsc::channel(settings.queue_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let applier = EventApplier::new(storage.clone());
    let applier_task = tokio::spawn(async move { applier.run(delivery_rx).await });

    let cloud: Arc<dyn Channel> = Arc::new(ReconciliationChannel::new(Arc::new(
        DirCloudStore::new(settings.cloud_dir.clone()),
    )));
    let scheduler = ReconciliationScheduler::new(
        owner,
        cloud,
        storage.clone(),
        delivery_tx.clone(),
        chrono::Duration::hours(settings.sync_threshold_hours),
    );
    let tick_every = Duration::from_secs(settings.tick_interval_secs.max(1));
    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_task =
        tokio::spawn(async move { scheduler.run(tick_every, scheduler_shutdown).await });

    let push_task = match settings.relay_url.as_deref() {
        Some(relay_url) => {
            let push: Arc<dyn Channel> = Arc::new(PushChannel::new(relay_url)?);
            Some(tokio::spawn(run_push_receiver(
                push,
                owner,
                delivery_tx.clone(),
                Duration::from_secs(settings.push_retry_secs.max(1)),
                shutdown_rx.clone(),
            )))
        }
        None => {
            info!("push: no relay configured, relying on reconciliation");
            None
        }
    };
    drop(delivery_tx);

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "sync: could not listen for ctrl-c, shutting down");
    }
    info!("sync: shutdown requested");
    let _ = shutdown_tx.send(true);

    scheduler_task.await.context("scheduler task panicked")?;
    if let Some(push_task) = push_task {
        let forwarded = push_task.await.context("push receiver task panicked")?;
        info!(forwarded, "push: receiver stopped");
    }
    let stats = applier_task.await.context("applier task panicked")?;
    info!(
        applied = stats.applied,
        skipped = stats.skipped,
        failed = stats.failed,
        "sync: local app stopped"
    );
    Ok(())
}
