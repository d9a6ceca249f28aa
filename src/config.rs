//! Runtime configuration from the environment

use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::api::sessions::{SessionStore, DEFAULT_MAX_PER_ORG, DEFAULT_TTL_MINUTES};
use crate::settlement::OrgClock;
use crate::validation::DEFAULT_TOP_N;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    NotANumber { key: &'static str, value: String },

    #[error("{key} is out of range: {value}")]
    OutOfRange { key: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Postgres backend when set; in-memory store otherwise.
    pub database_url: Option<String>,
    pub port: u16,
    pub org_utc_offset_hours: i32,
    pub nats_url: Option<String>,
    pub nats_subject: String,
    /// Domain events go to `<prefix>.<event name>`.
    pub nats_events_prefix: String,
    pub fuzzy_top_n: usize,
    pub db_max_connections: u32,
    pub upload_session_ttl_minutes: i64,
    pub max_sessions_per_org: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 8083,
            org_utc_offset_hours: 9,
            nats_url: None,
            nats_subject: "orders.admin.notifications".into(),
            nats_events_prefix: "orders.events".into(),
            fuzzy_top_n: DEFAULT_TOP_N,
            db_max_connections: 10,
            upload_session_ttl_minutes: DEFAULT_TTL_MINUTES,
            max_sessions_per_org: DEFAULT_MAX_PER_ORG,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let text = |key: &str| vars.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let config = Self {
            database_url: text("DATABASE_URL"),
            port: number(&vars, "PORT", defaults.port)?,
            org_utc_offset_hours: number(&vars, "ORG_UTC_OFFSET_HOURS", defaults.org_utc_offset_hours)?,
            nats_url: text("NATS_URL"),
            nats_subject: text("NATS_SUBJECT").unwrap_or(defaults.nats_subject),
            nats_events_prefix: text("NATS_EVENTS_PREFIX").unwrap_or(defaults.nats_events_prefix),
            fuzzy_top_n: number(&vars, "FUZZY_TOP_N", defaults.fuzzy_top_n)?,
            db_max_connections: number(&vars, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            upload_session_ttl_minutes: number(&vars, "UPLOAD_SESSION_TTL_MINUTES", defaults.upload_session_ttl_minutes)?,
            max_sessions_per_org: number(&vars, "MAX_SESSIONS_PER_ORG", defaults.max_sessions_per_org)?,
        };
        if config.clock().is_none() {
            return Err(ConfigError::OutOfRange { key: "ORG_UTC_OFFSET_HOURS", value: config.org_utc_offset_hours.to_string() });
        }
        if config.fuzzy_top_n == 0 {
            return Err(ConfigError::OutOfRange { key: "FUZZY_TOP_N", value: "0".into() });
        }
        if !(1..=7 * 24 * 60).contains(&config.upload_session_ttl_minutes) {
            return Err(ConfigError::OutOfRange {
                key: "UPLOAD_SESSION_TTL_MINUTES",
                value: config.upload_session_ttl_minutes.to_string(),
            });
        }
        if config.max_sessions_per_org == 0 {
            return Err(ConfigError::OutOfRange { key: "MAX_SESSIONS_PER_ORG", value: "0".into() });
        }
        Ok(config)
    }

    pub fn clock(&self) -> Option<OrgClock> { OrgClock::from_hours(self.org_utc_offset_hours) }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(chrono::Duration::minutes(self.upload_session_ttl_minutes), self.max_sessions_per_org)
    }
}

fn number<T: FromStr>(vars: &HashMap<String, String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::NotANumber { key, value: raw.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let c = AppConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(c, AppConfig::default());
        assert_eq!(c.port, 8083);
        assert_eq!(c.nats_subject, "orders.admin.notifications");
        assert_eq!(c.nats_events_prefix, "orders.events");
    }

    #[test]
    fn test_overrides() {
        let c = AppConfig::from_vars(vars(&[
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("PORT", "9000"),
            ("ORG_UTC_OFFSET_HOURS", "-5"),
            ("FUZZY_TOP_N", "3"),
            ("NATS_URL", " "),
            ("UPLOAD_SESSION_TTL_MINUTES", "15"),
            ("MAX_SESSIONS_PER_ORG", "3"),
        ])).unwrap();
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(c.port, 9000);
        assert_eq!(c.org_utc_offset_hours, -5);
        assert_eq!(c.fuzzy_top_n, 3);
        assert_eq!(c.nats_url, None);
        assert_eq!(c.upload_session_ttl_minutes, 15);
        assert_eq!(c.max_sessions_per_org, 3);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = AppConfig::from_vars(vars(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err, ConfigError::NotANumber { key: "PORT", value: "eighty".into() });
        assert!(matches!(AppConfig::from_vars(vars(&[("ORG_UTC_OFFSET_HOURS", "30")])), Err(ConfigError::OutOfRange { .. })));
        assert!(matches!(AppConfig::from_vars(vars(&[("FUZZY_TOP_N", "0")])), Err(ConfigError::OutOfRange { .. })));
        assert!(matches!(AppConfig::from_vars(vars(&[("UPLOAD_SESSION_TTL_MINUTES", "0")])), Err(ConfigError::OutOfRange { .. })));
        assert!(matches!(AppConfig::from_vars(vars(&[("MAX_SESSIONS_PER_ORG", "0")])), Err(ConfigError::OutOfRange { .. })));
    }
}
