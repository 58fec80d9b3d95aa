//! Process configuration read from the environment (and `.env` via dotenvy).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8083;
const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub admin_password: String,
    pub session_secret: String,
    pub admin_token_ttl: Duration,
    pub user_token_ttl: Duration,
    pub cart_ttl: Duration,
    pub cart_sweep_interval: Duration,
    pub notification_subject: String,
    pub event_subject_prefix: String,
    pub storefront_url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("SESSION_SECRET must be at least 32 bytes")]
    WeakSecret,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse = |name: &'static str, default: u64| -> Result<u64, ConfigError> { parsed(name, get(name), default) };
        let span = |name: &'static str, default: u64, unit_secs: u64| -> Result<Duration, ConfigError> {
            let n = parse(name, default)?;
            n.checked_mul(unit_secs).map(Duration::from_secs).ok_or(ConfigError::Invalid { name, value: n.to_string() })
        };

        let session_secret = get("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SECRET_LEN { return Err(ConfigError::WeakSecret); }

        Ok(Self {
            port: parsed("PORT", get("PORT"), DEFAULT_PORT)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), 10)?,
            nats_url: get("NATS_URL"),
            admin_password: get("ADMIN_PASSWORD").ok_or(ConfigError::Missing("ADMIN_PASSWORD"))?,
            session_secret,
            admin_token_ttl: span("ADMIN_TOKEN_TTL_MINUTES", 720, 60)?,
            user_token_ttl: span("USER_TOKEN_TTL_MINUTES", 10_080, 60)?,
            cart_ttl: span("CART_TTL_DAYS", 30, 86_400)?,
            cart_sweep_interval: Duration::from_secs(parse("CART_SWEEP_INTERVAL_SECS", 3_600)?.max(1)),
            notification_subject: get("NOTIFICATION_SUBJECT").unwrap_or_else(|| "storefront.notifications.email".into()),
            event_subject_prefix: get("EVENT_SUBJECT_PREFIX").unwrap_or_else(|| "storefront.events".into()),
            storefront_url: get("STOREFRONT_URL").unwrap_or_else(|| format!("http://localhost:{DEFAULT_PORT}")),
        })
    }
}

fn parsed<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", SECRET), ("ADMIN_PASSWORD", "pw")])).unwrap();
        assert_eq!(cfg.port, 8083);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.cart_ttl, Duration::from_secs(30 * 86_400));
        assert_eq!(cfg.admin_token_ttl, Duration::from_secs(720 * 60));
        assert_eq!(cfg.notification_subject, "storefront.notifications.email");
    }

    #[test]
    fn rejects_bad_values() {
        let weak = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", "short"), ("ADMIN_PASSWORD", "pw")]));
        assert_eq!(weak.unwrap_err(), ConfigError::WeakSecret);
        let port = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", SECRET), ("ADMIN_PASSWORD", "pw"), ("PORT", "http")]));
        assert_eq!(port.unwrap_err(), ConfigError::Invalid { name: "PORT", value: "http".into() });
        let missing = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", SECRET)]));
        assert_eq!(missing.unwrap_err(), ConfigError::Missing("ADMIN_PASSWORD"));
    }

    #[test]
    fn oversized_ttls_are_invalid() {
        let huge = u64::MAX.to_string();
        let days = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", SECRET), ("ADMIN_PASSWORD", "pw"), ("CART_TTL_DAYS", &huge)]));
        assert_eq!(days.unwrap_err(), ConfigError::Invalid { name: "CART_TTL_DAYS", value: huge.clone() });
        let minutes = AppConfig::from_lookup(lookup(&[("SESSION_SECRET", SECRET), ("ADMIN_PASSWORD", "pw"), ("USER_TOKEN_TTL_MINUTES", &huge)]));
        assert!(matches!(minutes.unwrap_err(), ConfigError::Invalid { name: "USER_TOKEN_TTL_MINUTES", .. }));
    }
}
