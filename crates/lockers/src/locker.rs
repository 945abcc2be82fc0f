//! Locker records and great-circle distance search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// `None` for coordinates outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locker {
    pub code: String,
    pub name: String,
    pub address: String,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub opening_hours: Option<String>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Locker {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A locker with its distance from the search origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockerMatch {
    #[serde(flatten)]
    pub locker: Locker,
    pub distance_km: f64,
}

pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Active lockers within `max_km` of `origin`, closest first (ties broken by
/// code), at most `limit` of them.
pub fn nearest(lockers: &[Locker], origin: GeoPoint, limit: usize, max_km: f64) -> Vec<LockerMatch> {
    let mut hits: Vec<LockerMatch> = lockers
        .iter()
        .filter(|l| l.active)
        .map(|l| LockerMatch {
            distance_km: haversine_km(origin, l.point()),
            locker: l.clone(),
        })
        .filter(|m| m.distance_km <= max_km)
        .collect();

    hits.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.locker.code.cmp(&b.locker.code))
    });
    hits.truncate(limit);
    hits
}
