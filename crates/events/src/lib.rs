//! Change notifications emitted after committed writes.
//!
//! The database is the source of truth; these events only fan out "something
//! changed" to live consumers (the admin SSE stream).

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{StoreEvent, Topic};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
