//! Operator configuration
//!
//! Read from `AVAILABILITY_OPERATOR_*` environment variables. Durations use
//! the friendly format (`30s`, `5m`, `1h 30m`).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use jiff::SignedDuration;

use crate::cache::CacheConfig;
use crate::client::AdaptiveConfig;
use crate::controller::{Error, Result};
use crate::crd::EnforcementMode;

pub const ENV_PREFIX: &str = "AVAILABILITY_OPERATOR_";

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    pub default_enforcement_mode: EnforcementMode,
    pub policy_cache_size: usize,
    pub policy_ttl: Duration,
    pub maintenance_ttl: Duration,
    pub learning_period: Duration,
    pub adjustment_interval: Duration,
    pub metrics_interval: Duration,
    pub min_timeout_multiplier: f64,
    pub max_timeout_multiplier: f64,
    pub base_timeout: Duration,
    pub sample_retention: Duration,
    pub max_samples: usize,
    pub max_concurrent_reconciles: u16,
    pub pdb_controller_enabled: bool,
    pub resync_interval: Duration,
    pub health_addr: SocketAddr,
    /// Watch a single namespace instead of the whole cluster
    pub watch_namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            default_enforcement_mode: EnforcementMode::Strict,
            policy_cache_size: 100,
            policy_ttl: Duration::from_secs(300),
            maintenance_ttl: Duration::from_secs(60),
            learning_period: Duration::from_secs(120),
            adjustment_interval: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(10),
            min_timeout_multiplier: 0.5,
            max_timeout_multiplier: 3.0,
            base_timeout: Duration::from_secs(30),
            sample_retention: Duration::from_secs(300),
            max_samples: 10_000,
            max_concurrent_reconciles: 5,
            pdb_controller_enabled: true,
            resync_interval: Duration::from_secs(300),
            health_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            watch_namespace: None,
        }
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    let signed: SignedDuration = raw
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}: invalid duration '{}': {}", key, raw, e)))?;
    Duration::try_from(signed)
        .map_err(|_| Error::InvalidConfig(format!("{}: duration '{}' is negative", key, raw)))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{}: invalid value '{}': {}", key, raw, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "{}: expected a boolean, got '{}'",
            key, raw
        ))),
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&key).map(|value| (key, value))
        };
        let mut config = Self::default();

        if let Some((key, raw)) = get("ENFORCEMENT_MODE") {
            config.default_enforcement_mode = EnforcementMode::parse(&raw).ok_or_else(|| {
                Error::InvalidConfig(format!("{}: unknown enforcement mode '{}'", key, raw))
            })?;
        }
        if let Some((key, raw)) = get("POLICY_CACHE_SIZE") {
            config.policy_cache_size = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = get("POLICY_TTL") {
            config.policy_ttl = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("MAINTENANCE_TTL") {
            config.maintenance_ttl = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("LEARNING_PERIOD") {
            config.learning_period = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("ADJUSTMENT_INTERVAL") {
            config.adjustment_interval = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("METRICS_INTERVAL") {
            config.metrics_interval = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("MIN_TIMEOUT_MULTIPLIER") {
            config.min_timeout_multiplier = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = get("MAX_TIMEOUT_MULTIPLIER") {
            config.max_timeout_multiplier = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = get("BASE_TIMEOUT") {
            config.base_timeout = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("SAMPLE_RETENTION") {
            config.sample_retention = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("MAX_SAMPLES") {
            config.max_samples = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = get("MAX_CONCURRENT_RECONCILES") {
            config.max_concurrent_reconciles = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = get("PDB_CONTROLLER_ENABLED") {
            config.pdb_controller_enabled = parse_bool(&key, &raw)?;
        }
        if let Some((key, raw)) = get("RESYNC_INTERVAL") {
            config.resync_interval = parse_duration(&key, &raw)?;
        }
        if let Some((key, raw)) = get("HEALTH_ADDR") {
            config.health_addr = parse_value(&key, &raw)?;
        }
        if let Some((_, raw)) = get("WATCH_NAMESPACE") {
            let raw = raw.trim();
            config.watch_namespace = (!raw.is_empty()).then(|| raw.to_string());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy_cache_size == 0 {
            return Err(Error::InvalidConfig(
                "policy cache size must be positive".to_string(),
            ));
        }
        if self.max_samples == 0 {
            return Err(Error::InvalidConfig(
                "max samples must be positive".to_string(),
            ));
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(Error::InvalidConfig(
                "max concurrent reconciles must be positive".to_string(),
            ));
        }
        if self.min_timeout_multiplier <= 0.0 || self.max_timeout_multiplier <= 0.0 {
            return Err(Error::InvalidConfig(
                "timeout multipliers must be positive".to_string(),
            ));
        }
        if self.min_timeout_multiplier > self.max_timeout_multiplier {
            return Err(Error::InvalidConfig(format!(
                "min timeout multiplier {} exceeds max {}",
                self.min_timeout_multiplier, self.max_timeout_multiplier
            )));
        }
        let intervals = [
            ("policy TTL", self.policy_ttl),
            ("maintenance TTL", self.maintenance_ttl),
            ("adjustment interval", self.adjustment_interval),
            ("metrics interval", self.metrics_interval),
            ("base timeout", self.base_timeout),
            ("resync interval", self.resync_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::InvalidConfig(format!("{} must be positive", name)));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.policy_cache_size,
            policy_ttl: self.policy_ttl,
            maintenance_ttl: self.maintenance_ttl,
        }
    }

    pub fn adaptive_config(&self) -> AdaptiveConfig {
        AdaptiveConfig {
            base_timeout: self.base_timeout,
            min_timeout_multiplier: self.min_timeout_multiplier,
            max_timeout_multiplier: self.max_timeout_multiplier,
            learning_period: self.learning_period,
            adjustment_interval: self.adjustment_interval,
            metrics_interval: self.metrics_interval,
            sample_retention: self.sample_retention,
            max_samples: self.max_samples,
            ..AdaptiveConfig::default()
        }
    }
}
