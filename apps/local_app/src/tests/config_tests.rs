use std::collections::HashMap;

use super::*;

fn env(vars: &[(&str, &str)]) -> Environment {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    app_environment().source(Some(map))
}

#[test]
fn defaults_apply_without_file_or_environment() {
    let settings = load_settings_from(None, env(&[])).expect("settings");
    assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
    assert_eq!(settings.relay_url, None);
    assert_eq!(settings.sync_threshold_hours, 168);
    assert_eq!(settings.tick_interval_secs, 3600);
    assert_eq!(settings.push_retry_secs, 15);
}

#[test]
fn file_then_environment_override_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("local_app.toml");
    fs::write(
        &file,
        "relay_url = \"http://127.0.0.1:8443\"\nowner_user_id = 42\nsync_threshold_hours = 24\n",
    )
    .expect("write config");

    let settings = load_settings_from(
        Some(&file),
        env(&[("APP__SYNC_THRESHOLD_HOURS", "72"), ("APP__CLOUD_DIR", "/mnt/cloud")]),
    )
    .expect("settings");
    assert_eq!(settings.relay_url.as_deref(), Some("http://127.0.0.1:8443"));
    assert_eq!(settings.owner_user_id, 42);
    assert_eq!(settings.sync_threshold_hours, 72);
    assert_eq!(settings.cloud_dir, PathBuf::from("/mnt/cloud"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.toml");
    assert!(load_settings_from(Some(&missing), env(&[])).is_err());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), DEFAULT_DATABASE_URL);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\local.db"),
        "sqlite:C:/Users/alice/local.db"
    );
}

#[test]
fn creates_parent_dir_for_sqlite_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("data").join("local.db");

    let url = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(url.starts_with("sqlite://"));
    assert!(dir.path().join("data").exists());
}
