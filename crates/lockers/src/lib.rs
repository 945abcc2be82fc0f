//! PUDO parcel lockers: the cached locker list, distance search, and the
//! provider/geocoder clients used to fill and query it.

pub mod geocode;
pub mod locker;
pub mod provider;

pub use geocode::{CachedGeocoder, GeocodeError, Geocoder, NominatimGeocoder, StaticGeocoder};
pub use locker::{haversine_km, nearest, GeoPoint, Locker, LockerMatch, EARTH_RADIUS_KM};
pub use provider::{LockerProvider, ProviderError, PudoHttpProvider};
