//! Address -> coordinates lookup for the "lockers near me" search.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::locker::GeoPoint;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder returned status {0}")]
    Status(u16),
    #[error("geocoder returned an invalid coordinate")]
    InvalidCoordinate,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the address could not be resolved.
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

/// Nominatim-compatible `/search` client, restricted to South Africa.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: impl Into<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("shopfront/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("q", address), ("format", "json"), ("limit", "1"), ("countrycodes", "za")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }
        let hits: Vec<NominatimHit> = resp.json().await?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };
        let lat = hit.lat.parse::<f64>().map_err(|_| GeocodeError::InvalidCoordinate)?;
        let lon = hit.lon.parse::<f64>().map_err(|_| GeocodeError::InvalidCoordinate)?;
        GeoPoint::new(lat, lon)
            .map(Some)
            .ok_or(GeocodeError::InvalidCoordinate)
    }
}

/// TTL cache in front of another geocoder. Misses are cached too, so a
/// mistyped address is not re-queried on every keystroke.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Cache<String, Option<GeoPoint>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn key(address: &str) -> String {
        address
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let key = Self::key(address);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(address = %key, "geocode cache hit");
            return Ok(hit);
        }
        let point = self.inner.geocode(&key).await?;
        self.cache.insert(key, point).await;
        Ok(point)
    }
}

/// Fixed lookup table; counts calls so caching can be observed.
#[derive(Debug, Default)]
pub struct StaticGeocoder {
    points: HashMap<String, GeoPoint>,
    calls: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, point: GeoPoint) -> Self {
        self.points.insert(address.trim().to_lowercase(), point);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.points.get(&address.trim().to_lowercase()).copied())
    }
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for std::sync::Arc<G> {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        (**self).geocode(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sea_point() -> GeoPoint {
        GeoPoint::new(-33.9175, 18.3870).unwrap()
    }

    #[tokio::test]
    async fn cache_absorbs_repeat_lookups() {
        let inner = Arc::new(StaticGeocoder::new().with("sea point, cape town", sea_point()));
        let cached = CachedGeocoder::new(inner.clone(), 100, Duration::from_secs(60));

        let a = cached.geocode("Sea Point,  Cape Town").await.unwrap();
        let b = cached.geocode("sea point, cape town").await.unwrap();
        assert_eq!(a, Some(sea_point()));
        assert_eq!(a, b);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn misses_are_cached() {
        let inner = Arc::new(StaticGeocoder::new());
        let cached = CachedGeocoder::new(inner.clone(), 100, Duration::from_secs(60));
        assert_eq!(cached.geocode("atlantis").await.unwrap(), None);
        assert_eq!(cached.geocode("Atlantis").await.unwrap(), None);
        assert_eq!(inner.calls(), 1);
    }
}
