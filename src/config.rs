//! Client configuration.
//!
//! Defaults can be overridden from a YAML file and then from the environment:
//! - `CHAT_STREAM_BASE_URL`
//! - `CHAT_STREAM_MODEL`
//! - `CHAT_STREAM_MAX_RETRIES` (default 3)
//! - `CHAT_STREAM_BASE_DELAY_MS` (default 1000)
//! - `CHAT_STREAM_MAX_DELAY_MS` (default 30000)
//! - `CHAT_STREAM_POLL_INTERVAL_MS` (default 1000)
//! - `CHAT_STREAM_TASK_TIMEOUT_MS` (default 60000)
//! - `CHAT_STREAM_HTTP_TIMEOUT_SECS` (default 120)
//! - `CHAT_STREAM_IDLE_TIMEOUT_MS` (default 60000, 0 disables)

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub default_model: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub task_timeout_ms: u64,
    pub request_timeout_secs: u64,
    /// Longest silence tolerated on an open stream. Heartbeats count as traffic.
    pub stream_idle_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            default_model: "default".to_string(),
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            poll_interval_ms: 1000,
            task_timeout_ms: 60_000,
            request_timeout_secs: 120,
            stream_idle_timeout_ms: 60_000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl ClientConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to parse config: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_details(path.display().to_string()),
            },
            other => other,
        })
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CHAT_STREAM_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("CHAT_STREAM_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("CHAT_STREAM_MODEL") {
            if !model.trim().is_empty() {
                self.default_model = model.trim().to_string();
            }
        }
        if let Some(v) = env_parse("CHAT_STREAM_MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_BASE_DELAY_MS") {
            self.base_delay_ms = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_MAX_DELAY_MS") {
            self.max_delay_ms = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_TASK_TIMEOUT_MS") {
            self.task_timeout_ms = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_HTTP_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("CHAT_STREAM_IDLE_TIMEOUT_MS") {
            self.stream_idle_timeout_ms = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url '{}': {}", self.base_url, e),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_source("config_validator"),
            )
        })?;
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration_with_context(
                "poll interval must be > 0",
                ErrorContext::new()
                    .with_field_path("config.poll_interval_ms")
                    .with_source("config_validator"),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::configuration_with_context(
                "max delay must be >= base delay",
                ErrorContext::new()
                    .with_field_path("config.max_delay_ms")
                    .with_source("config_validator"),
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_ms > 0)
            .then(|| Duration::from_millis(self.stream_idle_timeout_ms))
    }
}
