use std::env;
use std::str::FromStr;

use chrono_tz::Tz;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} is invalid: {1}")]
    Invalid(&'static str, String),
}

impl From<ConfigError> for std::io::Error {
    fn from(e: ConfigError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings read from the environment at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub listen_address: String,
    pub allow_origin: Option<String>,
    pub gtfs_url: String,
    pub vehicle_positions_url: String,
    pub alerts_url: String,
    /// Overrides the agency timezone
    pub timezone: Option<Tz>,
    pub vehicle_poll_seconds: u64,
    pub alert_poll_seconds: u64,
    /// Local minute of the day
    pub maintenance_minute: u32,
    pub retention_days: i64,
}

impl Config {
    pub fn from_env() -> ConfigResult<Config> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Config> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        Ok(Config {
            database_path: required("DATABASE_PATH")?,
            listen_address: lookup("LISTEN_ADDRESS").unwrap_or("127.0.0.1:8080".to_string()),
            allow_origin: lookup("ALLOW_ORIGIN"),
            gtfs_url: required("GTFS_URL")?,
            vehicle_positions_url: required("VEHICLE_POSITIONS_URL")?,
            alerts_url: required("ALERTS_URL")?,
            timezone: parse_optional(&lookup, "TIMEZONE")?,
            vehicle_poll_seconds: parse_optional(&lookup, "VEHICLE_POLL_SECONDS")?.unwrap_or(20),
            alert_poll_seconds: parse_optional(&lookup, "ALERT_POLL_SECONDS")?.unwrap_or(1800),
            maintenance_minute: match parse_optional::<u32>(&lookup, "MAINTENANCE_MINUTE")? {
                Some(minute) if minute >= 1440 => {
                    return Err(ConfigError::Invalid("MAINTENANCE_MINUTE", minute.to_string()))
                }
                Some(minute) => minute,
                None => 240,
            },
            retention_days: parse_optional(&lookup, "RETENTION_DAYS")?.unwrap_or(14),
        })
    }
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<Option<T>> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(name, value.clone()))
        })
        .transpose()
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_PATH", "/tmp/bb.db"),
        ("GTFS_URL", "https://example.com/gtfs.zip"),
        ("VEHICLE_POSITIONS_URL", "https://example.com/vp.json"),
        ("ALERTS_URL", "https://example.com/alerts"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:8080");
        assert_eq!(config.timezone, None);
        assert_eq!(config.vehicle_poll_seconds, 20);
        assert_eq!(config.alert_poll_seconds, 1800);
        assert_eq!(config.maintenance_minute, 240);
        assert_eq!(config.retention_days, 14);
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TIMEZONE", "America/Vancouver"));
        vars.push(("VEHICLE_POLL_SECONDS", "30"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.timezone, Some(chrono_tz::America::Vancouver));
        assert_eq!(config.vehicle_poll_seconds, 30);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err(),
            ConfigError::Missing("DATABASE_PATH")
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("TIMEZONE", "Mars/Olympus"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid("TIMEZONE", _))
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAINTENANCE_MINUTE", "1440"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
