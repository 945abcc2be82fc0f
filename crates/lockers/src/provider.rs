//! Upstream locker directory.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::locker::{GeoPoint, Locker};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("locker provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("locker provider returned malformed data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("locker provider returned status {0}")]
    Status(u16),
    #[error("locker provider is not configured")]
    NotConfigured,
}

/// Source of the full locker list.
#[async_trait]
pub trait LockerProvider: Send + Sync {
    async fn fetch_lockers(&self, now: DateTime<Utc>) -> Result<Vec<Locker>, ProviderError>;
}

/// PUDO REST client.
#[derive(Debug, Clone)]
pub struct PudoHttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PudoHttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PudoLocker {
    code: String,
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default, alias = "postalCode")]
    postal_code: Option<String>,
    #[serde(alias = "lat", deserialize_with = "f64_or_string")]
    latitude: f64,
    #[serde(alias = "lng", deserialize_with = "f64_or_string")]
    longitude: f64,
    #[serde(default, alias = "openingHours")]
    opening_hours: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// The directory serves coordinates as numbers or as numeric strings.
fn f64_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl PudoLocker {
    fn into_locker(self, now: DateTime<Utc>) -> Option<Locker> {
        GeoPoint::new(self.latitude, self.longitude)?;
        Some(Locker {
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            address: self.address.unwrap_or_default(),
            city: self.city,
            province: self.province,
            postal_code: self.postal_code,
            latitude: self.latitude,
            longitude: self.longitude,
            opening_hours: self.opening_hours,
            active: self.active,
            updated_at: now,
        })
    }
}

/// Parse a directory payload, dropping entries with impossible coordinates.
pub(crate) fn parse_lockers(body: &str, now: DateTime<Utc>) -> Result<Vec<Locker>, serde_json::Error> {
    let raw: Vec<PudoLocker> = serde_json::from_str(body)?;
    let total = raw.len();
    let lockers: Vec<Locker> = raw.into_iter().filter_map(|r| r.into_locker(now)).collect();
    if lockers.len() < total {
        warn!(dropped = total - lockers.len(), "skipped lockers with invalid coordinates");
    }
    Ok(lockers)
}

#[async_trait]
impl LockerProvider for PudoHttpProvider {
    async fn fetch_lockers(&self, now: DateTime<Utc>) -> Result<Vec<Locker>, ProviderError> {
        let url = format!("{}/lockers-data", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status(resp.status().as_u16()));
        }
        let body = resp.text().await?;
        let lockers = parse_lockers(&body, now)?;
        debug!(count = lockers.len(), "fetched locker directory");
        Ok(lockers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_and_string_coordinates() {
        let body = r#"[
            {"code": "CG45", "name": "Canal Walk", "lat": "-33.8930", "lng": 18.5113, "openingHours": "08:00-21:00"},
            {"code": "BAD1", "name": "Nowhere", "latitude": 123.0, "longitude": 0.0},
            {"code": "JHB2", "name": "Rosebank", "latitude": -26.1457, "longitude": 28.0444, "active": false}
        ]"#;
        let lockers = parse_lockers(body, Utc::now()).unwrap();
        assert_eq!(lockers.len(), 2);
        assert_eq!(lockers[0].code, "CG45");
        assert!((lockers[0].latitude + 33.893).abs() < 1e-9);
        assert_eq!(lockers[0].opening_hours.as_deref(), Some("08:00-21:00"));
        assert!(!lockers[1].active);
    }

    #[test]
    fn base_url_is_normalised() {
        let p = PudoHttpProvider::new("https://api.pudo.example/", "k").unwrap();
        assert_eq!(p.base_url, "https://api.pudo.example");
    }
}
