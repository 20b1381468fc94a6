use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::*;
use crate::model::TimeOfDay;

/// Engine options. Everything the rule engine reads from outside its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Step between consecutive bookable slots.
    pub granularity_minutes: u16,
    /// When set, slots before `approval_cutoff` start out pending.
    pub approval_enabled: bool,
    pub approval_cutoff: TimeOfDay,
    /// Region code passed to the external holiday source (e.g. "BW").
    pub holiday_region: String,
    pub holiday_cache_ttl_days: u32,
    /// Upper bound on one external holiday fetch.
    pub holiday_fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            granularity_minutes: 30,
            approval_enabled: false,
            approval_cutoff: TimeOfDay::NOON,
            holiday_region: "BW".to_string(),
            holiday_cache_ttl_days: 30,
            holiday_fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Malformed { key: &'static str, value: String },

    #[error("granularity out of range: {0} minutes")]
    Granularity(u16),

    #[error("invalid holiday region: {0:?}")]
    Region(String),

    #[error("holiday cache TTL out of range: {0} days")]
    CacheTtl(u32),

    #[error("holiday fetch timeout must be non-zero")]
    FetchTimeout,
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Malformed { key, value: raw }),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Read `WALKSLOT_*` variables over the defaults, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            granularity_minutes: env_or("WALKSLOT_GRANULARITY_MINUTES", defaults.granularity_minutes)?,
            approval_enabled: env_or("WALKSLOT_APPROVAL_ENABLED", defaults.approval_enabled)?,
            approval_cutoff: env_or("WALKSLOT_APPROVAL_CUTOFF", defaults.approval_cutoff)?,
            holiday_region: env_or("WALKSLOT_HOLIDAY_REGION", defaults.holiday_region)?,
            holiday_cache_ttl_days: env_or(
                "WALKSLOT_HOLIDAY_CACHE_TTL_DAYS",
                defaults.holiday_cache_ttl_days,
            )?,
            holiday_fetch_timeout: Duration::from_secs(env_or(
                "WALKSLOT_HOLIDAY_FETCH_TIMEOUT_SECS",
                defaults.holiday_fetch_timeout.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_GRANULARITY_MINUTES..=MAX_GRANULARITY_MINUTES).contains(&self.granularity_minutes) {
            return Err(ConfigError::Granularity(self.granularity_minutes));
        }
        if self.holiday_region.is_empty()
            || self.holiday_region.len() > MAX_REGION_LEN
            || !self.holiday_region.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::Region(self.holiday_region.clone()));
        }
        if self.holiday_cache_ttl_days == 0 || self.holiday_cache_ttl_days > MAX_HOLIDAY_CACHE_TTL_DAYS {
            return Err(ConfigError::CacheTtl(self.holiday_cache_ttl_days));
        }
        if self.holiday_fetch_timeout.is_zero() {
            return Err(ConfigError::FetchTimeout);
        }
        Ok(())
    }

    pub fn holiday_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.holiday_cache_ttl_days))
    }
}
