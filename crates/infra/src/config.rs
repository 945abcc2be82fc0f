//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use shopfront_core::Currency;
use thiserror::Error;
use tracing::warn;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PudoConfig {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub pudo: Option<PudoConfig>,
    pub geocoder_url: Option<String>,
    pub geocoder_cache_ttl: Duration,
    pub currency: Currency,
    pub courier_rate_cents: i64,
    pub locker_rate_cents: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            database_url: None,
            database_max_connections: 10,
            webhook_secret: None,
            webhook_tolerance_secs: 300,
            pudo: None,
            geocoder_url: None,
            geocoder_cache_ttl: Duration::from_secs(86_400),
            currency: Currency::Zar,
            courier_rate_cents: 9_900,
            locker_rate_cents: 6_000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(s) => s,
            None => {
                warn!("JWT_SECRET not set; using the development secret");
                defaults.jwt_secret
            }
        };

        let pudo = match (get("PUDO_API_URL"), get("PUDO_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(PudoConfig { api_url, api_key }),
            (None, None) => None,
            _ => {
                warn!("PUDO_API_URL and PUDO_API_KEY must both be set; locker refresh disabled");
                None
            }
        };

        Ok(Self {
            bind_addr: parse_or(get("BIND_ADDR"), "BIND_ADDR", "socket address", defaults.bind_addr)?,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(
                get("DATABASE_MAX_CONNECTIONS"),
                "DATABASE_MAX_CONNECTIONS",
                "integer",
                defaults.database_max_connections,
            )?,
            webhook_secret: get("YOCO_WEBHOOK_SECRET"),
            webhook_tolerance_secs: parse_or(
                get("YOCO_WEBHOOK_TOLERANCE_SECS"),
                "YOCO_WEBHOOK_TOLERANCE_SECS",
                "integer",
                defaults.webhook_tolerance_secs,
            )?,
            pudo,
            geocoder_url: get("GEOCODER_URL"),
            geocoder_cache_ttl: Duration::from_secs(parse_or(
                get("GEOCODER_CACHE_TTL_SECS"),
                "GEOCODER_CACHE_TTL_SECS",
                "integer",
                defaults.geocoder_cache_ttl.as_secs(),
            )?),
            currency: parse_or(get("STORE_CURRENCY"), "STORE_CURRENCY", "currency code", defaults.currency)?,
            courier_rate_cents: parse_cents(get("SHIPPING_FLAT_RATE_CENTS"), "SHIPPING_FLAT_RATE_CENTS", defaults.courier_rate_cents)?,
            locker_rate_cents: parse_cents(get("LOCKER_SHIPPING_RATE_CENTS"), "LOCKER_SHIPPING_RATE_CENTS", defaults.locker_rate_cents)?,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, expected, value }),
    }
}

fn parse_cents(raw: Option<String>, var: &'static str, default: i64) -> Result<i64, ConfigError> {
    let cents: i64 = parse_or(raw.clone(), var, "non-negative amount in cents", default)?;
    if cents < 0 {
        return Err(ConfigError::Invalid {
            var,
            expected: "non-negative amount in cents",
            value: raw.unwrap_or_default(),
        });
    }
    Ok(cents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(cfg.uses_dev_secret());
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = from(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("YOCO_WEBHOOK_TOLERANCE_SECS", "60"),
            ("PUDO_API_URL", "https://pudo.example"),
            ("PUDO_API_KEY", "k"),
            ("STORE_CURRENCY", "usd"),
            ("SHIPPING_FLAT_RATE_CENTS", "12000"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert!(!cfg.uses_dev_secret());
        assert_eq!(cfg.webhook_tolerance_secs, 60);
        assert_eq!(cfg.pudo.unwrap().api_key, "k");
        assert_eq!(cfg.currency, Currency::Usd);
        assert_eq!(cfg.courier_rate_cents, 12_000);
        assert_eq!(cfg.locker_rate_cents, 6_000);
    }

    #[test]
    fn half_configured_pudo_is_disabled() {
        let cfg = from(&[("PUDO_API_URL", "https://pudo.example")]).unwrap();
        assert!(cfg.pudo.is_none());
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = from(&[("DATABASE_MAX_CONNECTIONS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DATABASE_MAX_CONNECTIONS", .. }));
        assert!(from(&[("LOCKER_SHIPPING_RATE_CENTS", "-1")]).is_err());
        assert!(from(&[("STORE_CURRENCY", "XYZ")]).is_err());
    }
}
