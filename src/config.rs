use crate::store::StoreOptions;
use chrono_tz::Tz;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "data/stepledger.db";

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Store and ingestion settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub time_zone: Tz,
    pub write_batch_size: usize,
    pub flush_interval: Duration,
    pub max_update_age_days: i64,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            time_zone: Tz::UTC,
            write_batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_update_age_days: 30,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional:
    /// - `STEPLEDGER_DB_PATH` (default `data/stepledger.db`, must not be blank when set)
    /// - `STEPLEDGER_TIMEZONE` IANA name (default `UTC`)
    /// - `STEPLEDGER_WRITE_BATCH_SIZE` (default 100)
    /// - `STEPLEDGER_FLUSH_INTERVAL_SECS` (default 5)
    /// - `STEPLEDGER_MAX_UPDATE_AGE_DAYS` (default 30)
    /// - `STEPLEDGER_BUSY_TIMEOUT_MS` (default 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = match lookup("STEPLEDGER_DB_PATH") {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::MissingVariable("STEPLEDGER_DB_PATH".to_string()))
            }
            Some(path) => PathBuf::from(path.trim()),
            None => defaults.db_path,
        };

        let time_zone = match lookup("STEPLEDGER_TIMEZONE") {
            Some(name) => parse_time_zone(&name)?,
            None => defaults.time_zone,
        };

        let write_batch_size = parse_number(&lookup, "STEPLEDGER_WRITE_BATCH_SIZE", defaults.write_batch_size)?;
        if write_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "STEPLEDGER_WRITE_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        let flush_interval = Duration::from_secs(parse_number(
            &lookup,
            "STEPLEDGER_FLUSH_INTERVAL_SECS",
            defaults.flush_interval.as_secs(),
        )?);

        let max_update_age_days =
            parse_number(&lookup, "STEPLEDGER_MAX_UPDATE_AGE_DAYS", defaults.max_update_age_days)?;
        if max_update_age_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "STEPLEDGER_MAX_UPDATE_AGE_DAYS must be positive".to_string(),
            ));
        }
        if chrono::Duration::try_days(max_update_age_days).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "STEPLEDGER_MAX_UPDATE_AGE_DAYS {} is too large",
                max_update_age_days
            )));
        }

        let busy_timeout = Duration::from_millis(parse_number(
            &lookup,
            "STEPLEDGER_BUSY_TIMEOUT_MS",
            defaults.busy_timeout.as_millis() as u64,
        )?);

        Ok(Self {
            db_path,
            time_zone,
            write_batch_size,
            flush_interval,
            max_update_age_days,
            busy_timeout,
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: self.busy_timeout,
            max_update_age: chrono::Duration::try_days(self.max_update_age_days)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

pub fn parse_time_zone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::InvalidValue(format!("Unknown time zone '{}'", name)))
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be a number, got '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.time_zone, Tz::UTC);
        assert_eq!(config.write_batch_size, 100);
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.store_options().max_update_age, chrono::Duration::days(30));
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("STEPLEDGER_DB_PATH", "/tmp/steps.db"),
            ("STEPLEDGER_TIMEZONE", "America/New_York"),
            ("STEPLEDGER_WRITE_BATCH_SIZE", "25"),
            ("STEPLEDGER_FLUSH_INTERVAL_SECS", " 2 "),
            ("STEPLEDGER_MAX_UPDATE_AGE_DAYS", "7"),
            ("STEPLEDGER_BUSY_TIMEOUT_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/steps.db"));
        assert_eq!(config.time_zone, chrono_tz::America::New_York);
        assert_eq!(config.write_batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_secs(2));
        assert_eq!(config.store_options().busy_timeout, Duration::ZERO);
        assert_eq!(config.store_options().max_update_age, chrono::Duration::days(7));
    }

    #[test]
    fn test_blank_db_path() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_DB_PATH", "  ")])),
            Err(ConfigError::MissingVariable(var)) if var == "STEPLEDGER_DB_PATH"
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_TIMEZONE", "Mars/Olympus")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_WRITE_BATCH_SIZE", "lots")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_WRITE_BATCH_SIZE", "0")])),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_MAX_UPDATE_AGE_DAYS", "-1")])),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_huge_update_age() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("STEPLEDGER_MAX_UPDATE_AGE_DAYS", "9223372036854775807")])),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("too large")
        ));

        let config = StoreConfig {
            max_update_age_days: i64::MAX,
            ..StoreConfig::default()
        };
        assert_eq!(config.store_options().max_update_age, chrono::Duration::MAX);
    }
}
