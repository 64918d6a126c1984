//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code, parsed from JSON, or loaded from
//! `<config dir>/dispatch-sdk/config.json`, and then overridden from the
//! environment:
//!
//! - `DISPATCH_CLIENT_NAMESPACE`: namespace prefixed to user event keys
//! - `DISPATCH_CLIENT_MAX_RETRIES`: durable listener retry budget (`0` = unbounded)
//! - `DISPATCH_CLIENT_ROTATION_SECS`: durable stream lifetime (`0` = never rotate)

use std::path::{Path, PathBuf};
use std::time::Duration;

use dispatch_stream::ListenerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

pub const ENV_NAMESPACE: &str = "DISPATCH_CLIENT_NAMESPACE";
pub const ENV_MAX_RETRIES: &str = "DISPATCH_CLIENT_MAX_RETRIES";
pub const ENV_ROTATION_SECS: &str = "DISPATCH_CLIENT_ROTATION_SECS";

/// Overrides applied on top of a listener's built-in defaults.
///
/// Unset fields keep the default of the listener they apply to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerOverrides {
    pub retry_base_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    /// `0` disables the limit
    pub max_retries: Option<u32>,
    pub replay_settle_delay_ms: Option<u64>,
    /// `0` disables rotation
    pub rotation_interval_secs: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
}

impl ListenerOverrides {
    /// Apply the overrides to `base` and validate the result.
    pub fn apply(&self, mut base: ListenerConfig) -> Result<ListenerConfig> {
        if let Some(ms) = self.retry_base_delay_ms {
            base.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_retry_delay_ms {
            base.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = self.max_retries {
            base.max_retries = (retries > 0).then_some(retries);
        }
        if let Some(ms) = self.replay_settle_delay_ms {
            base.replay_settle_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.rotation_interval_secs {
            base.rotation_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(ms) = self.shutdown_timeout_ms {
            base.shutdown_timeout = Duration::from_millis(ms);
        }

        base.validate()
            .map_err(|e| SdkError::Config(e.to_string()))?;
        Ok(base)
    }
}

/// Configuration for a [`DispatcherClient`](crate::DispatcherClient).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefixed to user event keys in durable wait conditions
    pub namespace: Option<String>,
    pub run_listener: ListenerOverrides,
    pub durable_listener: ListenerOverrides,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SdkError::Config(format!("Invalid config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    /// `<config dir>/dispatch-sdk/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dispatch-sdk").join("config.json"))
    }

    /// Load the config file at [`default_path`](Self::default_path) when it
    /// exists, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading client config from {}", path.display());
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env()
    }

    /// Override fields from `DISPATCH_CLIENT_*` environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Override fields from any variable source.
    pub fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            self.namespace = Some(namespace).filter(|ns| !ns.is_empty());
        }

        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.durable_listener.max_retries = Some(parse_var(ENV_MAX_RETRIES, &value)?);
        }

        if let Some(value) = lookup(ENV_ROTATION_SECS) {
            self.durable_listener.rotation_interval_secs =
                Some(parse_var(ENV_ROTATION_SECS, &value)?);
        }

        Ok(self)
    }

    pub fn run_listener_config(&self) -> Result<ListenerConfig> {
        self.run_listener.apply(ListenerConfig::run_listener())
    }

    pub fn durable_listener_config(&self) -> Result<ListenerConfig> {
        self.durable_listener.apply(ListenerConfig::durable_listener())
    }

    /// Prefix `key` with the namespace unless it already carries it.
    pub fn apply_namespace(&self, key: &str) -> String {
        match self.namespace.as_deref() {
            Some(namespace) if !key.starts_with(namespace) => format!("{namespace}{key}"),
            _ => key.to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SdkError::Config(format!("Invalid value for {name}: {value:?}")))
}
