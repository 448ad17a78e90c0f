use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::services::alerts::{DEFAULT_ALERT_COOLDOWN_SECONDS, MAX_ALERT_COOLDOWN_SECONDS};
use crate::services::collector::{DEFAULT_POLL_INTERVAL_SECONDS, MIN_POLL_INTERVAL_SECONDS};

pub const DEFAULT_DEVICE_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_HISTORY_POINT_LIMIT: i64 = 50_000;

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    poll_interval_seconds: Option<u64>,
    #[serde(default)]
    run_collector: Option<bool>,
    #[serde(default)]
    device_bridge_url: Option<String>,
    #[serde(default)]
    device_timeout_seconds: Option<u64>,
    #[serde(default)]
    alert_cooldown_seconds: Option<u64>,
    #[serde(default)]
    history_point_limit: Option<i64>,
}

fn load_config_overrides(path: &Path) -> Option<ConfigOverrides> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config overrides file not found; using env only");
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config overrides; using env only"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config overrides; using env only"
            );
            None
        }
    }
}

fn apply_overrides(config: &mut AppConfig, overrides: &ConfigOverrides) {
    if let Some(value) = overrides.poll_interval_seconds.filter(|v| *v != 0) {
        config.poll_interval_seconds = value;
    }
    if let Some(enabled) = overrides.run_collector {
        config.run_collector = enabled;
    }
    if let Some(url) = overrides.device_bridge_url.as_deref() {
        let trimmed = url.trim();
        config.device_bridge_url = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }
    if let Some(value) = overrides.device_timeout_seconds.filter(|v| *v != 0) {
        config.device_timeout_seconds = value;
    }
    if let Some(value) = overrides.alert_cooldown_seconds {
        config.alert_cooldown_seconds = value;
    }
    if let Some(value) = overrides.history_point_limit.filter(|v| *v > 0) {
        config.history_point_limit = value;
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub poll_interval_seconds: u64,
    pub run_collector: bool,
    pub device_bridge_url: Option<String>,
    pub device_timeout_seconds: u64,
    pub alert_cooldown_seconds: u64,
    pub history_point_limit: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = env_optional_path("AIRQ_CONFIG_PATH")
            .and_then(|path| load_config_overrides(&path));

        let database_url = env_optional_string("AIRQ_DATABASE_URL")
            .or_else(|| env_optional_string("DATABASE_URL"))
            .or_else(|| {
                overrides
                    .as_ref()
                    .and_then(|ov| ov.database_url.as_deref())
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(|value| value.to_string())
            })
            .context("AIRQ_DATABASE_URL (or DATABASE_URL) must be set, or present as database_url in the config overrides file")?;

        let mut config = Self {
            database_url,
            poll_interval_seconds: env_u64(
                "AIRQ_POLL_INTERVAL_SECONDS",
                DEFAULT_POLL_INTERVAL_SECONDS,
            ),
            run_collector: env_bool("AIRQ_RUN_COLLECTOR", true),
            device_bridge_url: env_optional_string("AIRQ_DEVICE_BRIDGE_URL"),
            device_timeout_seconds: env_u64(
                "AIRQ_DEVICE_TIMEOUT_SECONDS",
                DEFAULT_DEVICE_TIMEOUT_SECONDS,
            ),
            alert_cooldown_seconds: env_u64(
                "AIRQ_ALERT_COOLDOWN_SECONDS",
                DEFAULT_ALERT_COOLDOWN_SECONDS,
            ),
            history_point_limit: env_i64("AIRQ_HISTORY_POINT_LIMIT", DEFAULT_HISTORY_POINT_LIMIT),
        };
        if let Some(overrides) = overrides.as_ref() {
            apply_overrides(&mut config, overrides);
        }
        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        self.poll_interval_seconds = self.poll_interval_seconds.max(MIN_POLL_INTERVAL_SECONDS);
        self.device_timeout_seconds = self.device_timeout_seconds.max(1);
        self.alert_cooldown_seconds = self.alert_cooldown_seconds.min(MAX_ALERT_COOLDOWN_SECONDS);
        if self.history_point_limit <= 0 {
            self.history_point_limit = DEFAULT_HISTORY_POINT_LIMIT;
        }
    }

    /// Bridge URL to poll, if the collector should run at all.
    pub fn collector_bridge_url(&self) -> Option<&str> {
        if !self.run_collector {
            return None;
        }
        self.device_bridge_url.as_deref()
    }
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_optional_path(key: &str) -> Option<PathBuf> {
    env_optional_string(key).map(PathBuf::from)
}
