use std::{fs, path::Path};

use serde::Deserialize;

pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub max_body_bytes: usize,
    /// Events buffered per user before a slow subscriber starts lagging.
    pub channel_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8443".into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            channel_capacity: 256,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("relay.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then the optional toml file, then environment overrides.
pub fn load_settings_from(file: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        if let Ok(file_cfg) = raw.parse::<toml::Table>() {
            if let Some(v) = file_cfg.get("bind_addr").and_then(|v| v.as_str()) {
                settings.bind_addr = v.to_string();
            }
            if let Some(v) = file_cfg
                .get("max_body_bytes")
                .and_then(|v| v.as_integer())
                .and_then(|v| usize::try_from(v).ok())
            {
                settings.max_body_bytes = v;
            }
            if let Some(v) = file_cfg
                .get("channel_capacity")
                .and_then(|v| v.as_integer())
                .and_then(|v| usize::try_from(v).ok())
            {
                settings.channel_capacity = v;
            }
        }
    }

    if let Some(v) = env("RELAY_BIND") {
        settings.bind_addr = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(parsed) = env("APP__MAX_BODY_BYTES").and_then(|v| v.parse::<usize>().ok()) {
        settings.max_body_bytes = parsed;
    }
    if let Some(parsed) = env("APP__CHANNEL_CAPACITY").and_then(|v| v.parse::<usize>().ok()) {
        settings.channel_capacity = parsed;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
