use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/local.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub database_url: String,
    /// Push is disabled when unset; reconciliation still runs.
    pub relay_url: Option<String>,
    pub cloud_dir: PathBuf,
    pub owner_user_id: i64,
    pub sync_threshold_hours: i64,
    pub tick_interval_secs: u64,
    pub push_retry_secs: u64,
    pub queue_capacity: usize,
}

pub fn load_settings(file: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_from(file, app_environment())
}

pub fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
}

/// Defaults, then the toml file (`local_app.toml` when none is given), then
/// `APP__*` environment variables.
pub fn load_settings_from(file: Option<&Path>, env: Environment) -> anyhow::Result<Settings> {
    let file_source = match file {
        Some(path) => File::from(path).required(true),
        None => File::with_name("local_app").required(false),
    };

    let settings = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("cloud_dir", "./data/cloud")?
        .set_default("owner_user_id", 1_i64)?
        .set_default("sync_threshold_hours", 168_i64)?
        .set_default("tick_interval_secs", 3600_i64)?
        .set_default("push_retry_secs", 15_i64)?
        .set_default("queue_capacity", 256_i64)?
        .add_source(file_source)
        .add_source(env)
        .build()
        .context("failed to load local_app settings")?
        .try_deserialize::<Settings>()
        .context("invalid local_app settings")?;
    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite:{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
