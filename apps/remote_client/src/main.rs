use std::{path::PathBuf, sync::Arc};

use anyhow::bail;
use clap::Parser;
use conversation::{SessionStateMachine, SessionStore};
use shared::domain::{CourseOption, UserId};
use sync_core::{Broadcaster, DirCloudStore, PushChannel, ReconciliationChannel};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chat;

use chat::{ChatClient, HELP};

/// Line-oriented chat front end that turns conversations into events and
/// sends them to the primary device.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    user_id: i64,
    /// Relay base url for the push channel, e.g. http://127.0.0.1:8443
    #[arg(long)]
    relay_url: Option<String>,
    /// Shared directory backing the reconciliation channel.
    #[arg(long)]
    cloud_dir: Option<PathBuf>,
    /// Course offered for course-tied projects, as `id=Name`. Repeatable.
    #[arg(long = "course", value_parser = parse_course)]
    courses: Vec<CourseOption>,
    /// Drop unfinished conversations idle for this long.
    #[arg(long)]
    session_ttl_minutes: Option<i64>,
}

fn parse_course(raw: &str) -> Result<CourseOption, String> {
    let (course_id, name) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected id=Name, got '{raw}'"))?;
    let (course_id, name) = (course_id.trim(), name.trim());
    if course_id.is_empty() || name.is_empty() {
        return Err(format!("expected id=Name, got '{raw}'"));
    }
    Ok(CourseOption {
        course_id: course_id.to_string(),
        name: name.to_string(),
    })
}

fn build_broadcaster(args: &Args) -> anyhow::Result<Broadcaster> {
    let mut broadcaster = Broadcaster::default();
    if let Some(relay_url) = args.relay_url.as_deref() {
        broadcaster = broadcaster.with_channel(Arc::new(PushChannel::new(relay_url)?));
    }
    if let Some(cloud_dir) = &args.cloud_dir {
        let store = Arc::new(DirCloudStore::new(cloud_dir.clone()));
        broadcaster = broadcaster.with_channel(Arc::new(ReconciliationChannel::new(store)));
    }
    if broadcaster.is_empty() {
        bail!("configure at least one channel with --relay-url or --cloud-dir");
    }
    Ok(broadcaster)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let broadcaster = build_broadcaster(&args)?;
    let store = match args.session_ttl_minutes {
        Some(minutes) if minutes > 0 => SessionStore::with_ttl(chrono::Duration::minutes(minutes)),
        _ => SessionStore::new(),
    };
    let machine = SessionStateMachine::new(store, args.courses.clone());
    let mut client = ChatClient::new(UserId(args.user_id), machine, broadcaster);
    info!(user_id = client.user_id().0, "conversation: chat client ready");

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        for reply in client.handle_line(&line).await {
            println!("{reply}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_course_options() {
        let course = parse_course("cs101=Algorithms").expect("course");
        assert_eq!(course.course_id, "cs101");
        assert_eq!(course.name, "Algorithms");
        assert!(parse_course("cs101").is_err());
        assert!(parse_course("=Algorithms").is_err());
    }

    #[test]
    fn requires_a_channel() {
        let args = Args::parse_from(["remote_client", "--user-id", "42"]);
        assert!(build_broadcaster(&args).is_err());

        let args = Args::parse_from([
            "remote_client",
            "--user-id",
            "42",
            "--cloud-dir",
            "/tmp/cloud",
            "--relay-url",
            "http://127.0.0.1:8443",
            "--course",
            "cs101=Algorithms",
        ]);
        assert_eq!(args.courses.len(), 1);
        assert_eq!(build_broadcaster(&args).expect("broadcaster").len(), 2);
    }
}
