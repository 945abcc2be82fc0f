//! Infrastructure layer: configuration, Postgres wiring and the store
//! implementations behind the domain crates.

pub mod config;
pub mod db;
pub mod error;
pub mod store;

pub use config::{AppConfig, ConfigError, PudoConfig};
pub use error::{StoreError, StoreResult};
pub use store::{
    CatalogStore, InMemoryStore, LockerStore, OrderChange, OrderStore, PgStore, PromotionStore,
    ShipmentUpdate, Stores, SupplierOrderFilter, SupplierOrderUpdate,
};
