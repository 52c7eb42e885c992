use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use shared::{
    domain::{ProjectId, UserId},
    event::EventSource,
};
use storage::Storage;
use sync_core::{
    Channel, DirCloudStore, EventApplier, ReconciliationChannel, SyncStateStore,
};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/local.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListProjects {
        #[arg(long)]
        owner: Option<i64>,
    },
    Sessions {
        project_id: String,
    },
    Ledger {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    SyncStatus,
    /// Runs one reconciliation pass right away, ignoring the threshold.
    Import {
        #[arg(long)]
        cloud_dir: PathBuf,
        #[arg(long)]
        user_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Arc::new(Storage::new(&cli.database_url).await?);

    match cli.command {
        Command::ListProjects { owner } => {
            for project in storage.list_projects(owner.map(UserId)).await? {
                println!(
                    "{} owner={} deadline={} priority={} type={} status={} progress={}% title={:?}",
                    project.project_id,
                    project.owner_user_id.0,
                    project.deadline,
                    project.priority.as_str(),
                    project.project_type.as_str(),
                    project.status.map(|status| status.as_str()).unwrap_or("-"),
                    project.progress,
                    project.title
                );
            }
        }
        Command::Sessions { project_id } => {
            let project_id = ProjectId::parse(&project_id)
                .ok_or_else(|| anyhow!("'{project_id}' is not a project id"))?;
            for session in storage.list_progress_sessions(project_id).await? {
                println!(
                    "{} logged_at={} status={} minutes={} progress={}% note={:?}",
                    session.session_id,
                    session.logged_at.to_rfc3339(),
                    session.status.as_str(),
                    session.duration_minutes,
                    session.progress,
                    session.note
                );
            }
        }
        Command::Ledger { limit } => {
            println!("applied events: {}", storage.count_applied().await?);
            for record in storage.list_applied(limit).await? {
                println!(
                    "{} type={} via={} applied_at={} hash={}",
                    record.event_id,
                    record.event_type,
                    record.source,
                    record.applied_at.to_rfc3339(),
                    record.payload_hash
                );
            }
        }
        Command::SyncStatus => {
            let states = storage.list_sync_state().await?;
            if states.is_empty() {
                println!("no successful sync recorded");
            }
            for state in states {
                println!("{} last_success_at={}", state.channel, state.last_success_at.to_rfc3339());
            }
        }
        Command::Import { cloud_dir, user_id } => {
            let (tx, rx) = mpsc::channel(256);
            let applier = EventApplier::new(storage.clone());
            let applier_task = tokio::spawn(async move { applier.run(rx).await });

            let channel =
                ReconciliationChannel::new(Arc::new(DirCloudStore::new(cloud_dir.clone())));
            let received = channel.receive(UserId(user_id), &tx).await;
            drop(tx);
            let stats = applier_task.await.context("applier task panicked")?;
            let forwarded = received
                .with_context(|| format!("failed to read cloud dir '{}'", cloud_dir.display()))?;
            storage
                .record_successful_sync(EventSource::Reconciliation, Utc::now())
                .await?;
            println!(
                "forwarded={forwarded} applied={} skipped={} failed={}",
                stats.applied, stats.skipped, stats.failed
            );
        }
    }

    Ok(())
}
