//! Agent configuration, read from `SAMPLER_*` environment variables.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use sampler_delivery::DeliveryWorkerConfig;
use sampler_gate::GatePolicy;

pub const COLLECTOR_URL: &str = "SAMPLER_COLLECTOR_URL";
pub const DATABASE_URL: &str = "SAMPLER_DATABASE_URL";
pub const LISTEN_ADDR: &str = "SAMPLER_LISTEN_ADDR";
pub const DELIVERY_INTERVAL_SECS: &str = "SAMPLER_DELIVERY_INTERVAL_SECS";
pub const TRANSPORT_TIMEOUT_MS: &str = "SAMPLER_TRANSPORT_TIMEOUT_MS";
pub const MIN_SPACING_SECS: &str = "SAMPLER_MIN_SPACING_SECS";
pub const MAX_PER_DAY: &str = "SAMPLER_MAX_PER_DAY";
pub const MAX_PER_WEEK: &str = "SAMPLER_MAX_PER_WEEK";
pub const PROMPT_TIMEOUT_MS: &str = "SAMPLER_PROMPT_TIMEOUT_MS";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(
        "delivery interval ({interval_ms} ms) must be longer than the transport timeout ({timeout_ms} ms)"
    )]
    IntervalNotAboveTimeout { interval_ms: u128, timeout_ms: u128 },
}

/// Everything the agent binary needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub collector_url: String,
    pub database_url: String,
    pub listen_addr: String,
    pub delivery_interval: Duration,
    pub transport_timeout: Duration,
    pub gate: GatePolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        let worker = DeliveryWorkerConfig::default();
        Self {
            collector_url: "http://127.0.0.1:8787/submitsurvey".to_string(),
            database_url: "sqlite://sampler.db".to_string(),
            listen_addr: "127.0.0.1:8080".to_string(),
            delivery_interval: worker.interval,
            transport_timeout: worker.send_timeout,
            gate: GatePolicy::default(),
        }
    }
}

impl SamplerConfig {
    /// Read the process environment. Unset variables fall back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
            .context("invalid sampler configuration")
    }

    /// Build from any variable source; `lookup` returns `None` for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let collector_url = lookup(COLLECTOR_URL).unwrap_or_else(|| {
            warn!(
                collector_url = %defaults.collector_url,
                "{COLLECTOR_URL} not set; using local default"
            );
            defaults.collector_url.clone()
        });
        let database_url = lookup(DATABASE_URL).unwrap_or_else(|| defaults.database_url.clone());
        let listen_addr = lookup(LISTEN_ADDR).unwrap_or_else(|| defaults.listen_addr.clone());

        let delivery_interval = match parse_number::<u64, _>(&lookup, DELIVERY_INTERVAL_SECS)? {
            Some(0) => return Err(invalid(DELIVERY_INTERVAL_SECS, "0", "must be positive")),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.delivery_interval,
        };
        let transport_timeout = match parse_number::<u64, _>(&lookup, TRANSPORT_TIMEOUT_MS)? {
            Some(0) => return Err(invalid(TRANSPORT_TIMEOUT_MS, "0", "must be positive")),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.transport_timeout,
        };

        let mut gate = defaults.gate.clone();
        if let Some(secs) = parse_number::<u64, _>(&lookup, MIN_SPACING_SECS)? {
            gate.min_spacing = Duration::from_secs(secs);
        }
        if let Some(max) = parse_number::<u32, _>(&lookup, MAX_PER_DAY)? {
            gate.max_per_day = max;
        }
        if let Some(max) = parse_number::<u32, _>(&lookup, MAX_PER_WEEK)? {
            gate.max_per_week = (max > 0).then_some(max);
        }
        if let Some(ms) = parse_number::<u64, _>(&lookup, PROMPT_TIMEOUT_MS)? {
            gate.prompt_timeout = Duration::from_millis(ms);
        }

        let config = Self {
            collector_url,
            database_url,
            listen_addr,
            delivery_interval,
            transport_timeout,
            gate,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery_interval <= self.transport_timeout {
            return Err(ConfigError::IntervalNotAboveTimeout {
                interval_ms: self.delivery_interval.as_millis(),
                timeout_ms: self.transport_timeout.as_millis(),
            });
        }
        Ok(())
    }

    pub fn worker_config(&self) -> DeliveryWorkerConfig {
        DeliveryWorkerConfig::default()
            .with_interval(self.delivery_interval)
            .with_send_timeout(self.transport_timeout)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &raw, e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<SamplerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SamplerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn unset_environment_uses_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, SamplerConfig::default());
        assert_eq!(config.delivery_interval, Duration::from_secs(600));
        assert_eq!(config.transport_timeout, Duration::from_millis(4_000));
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            (COLLECTOR_URL, "https://collector.example/submit"),
            (DELIVERY_INTERVAL_SECS, "60"),
            (TRANSPORT_TIMEOUT_MS, "1500"),
            (MIN_SPACING_SECS, "120"),
            (MAX_PER_DAY, "4"),
            (MAX_PER_WEEK, "0"),
            (PROMPT_TIMEOUT_MS, "5000"),
        ])
        .unwrap();

        assert_eq!(config.collector_url, "https://collector.example/submit");
        assert_eq!(config.delivery_interval, Duration::from_secs(60));
        assert_eq!(config.gate.min_spacing, Duration::from_secs(120));
        assert_eq!(config.gate.max_per_day, 4);
        assert_eq!(config.gate.max_per_week, None);
        assert_eq!(config.gate.prompt_timeout, Duration::from_millis(5_000));
        assert_eq!(config.worker_config().send_timeout, Duration::from_millis(1_500));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = from_pairs(&[(MAX_PER_DAY, "two")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: MAX_PER_DAY, .. }));
    }

    #[test]
    fn interval_must_exceed_transport_timeout() {
        let err = from_pairs(&[(DELIVERY_INTERVAL_SECS, "4"), (TRANSPORT_TIMEOUT_MS, "4000")])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::IntervalNotAboveTimeout {
                interval_ms: 4_000,
                timeout_ms: 4_000
            }
        );
    }
}
