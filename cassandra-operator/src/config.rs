//! Runtime configuration.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The operator's logging config, used when `RUST_LOG` is not set.
    #[serde(default = "Config::default_log_level")]
    pub log_level: String,
    /// The namespace to watch for Cassandra clusters; empty to watch all namespaces.
    #[serde(default)]
    pub operator_namespace: String,
    /// The port used for HTTP webhooks, metrics and healthchecks.
    #[serde(default = "Config::default_http_port")]
    pub http_port: u16,

    /// The interval at which metrics are gathered from every online cluster.
    #[serde(default = "Config::default_metric_poll_interval", deserialize_with = "Config::parse_duration")]
    pub metric_poll_interval: Duration,
    /// The timeout applied to each request made while gathering metrics.
    #[serde(default = "Config::default_metric_request_duration", deserialize_with = "Config::parse_duration")]
    pub metric_request_duration: Duration,

    /// Allow clusters to use `emptyDir` volumes instead of persistent volume claims.
    #[serde(default)]
    pub allow_empty_dir: bool,
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Self = envy::from_env().context("error building config from env")?;
        config.validated()
    }

    /// Check the invariants of this config which serde can not express.
    pub fn validated(self) -> Result<Self> {
        if self.metric_poll_interval.is_zero() {
            bail!("METRIC_POLL_INTERVAL must be greater than zero");
        }
        Ok(self)
    }

    /// Parse a human readable duration such as `5s` or `1m30s`.
    fn parse_duration<'de, D: Deserializer<'de>>(val: D) -> Result<Duration, D::Error> {
        let raw: String = Deserialize::deserialize(val)?;
        humantime::parse_duration(raw.trim()).map_err(|err| DeError::custom(format!("error parsing duration '{}': {}", raw, err)))
    }

    fn default_log_level() -> String {
        "info".into()
    }

    fn default_http_port() -> u16 {
        9090
    }

    fn default_metric_poll_interval() -> Duration {
        Duration::from_secs(5)
    }

    fn default_metric_request_duration() -> Duration {
        Duration::from_secs(2)
    }
}
