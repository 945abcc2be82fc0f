//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, DEFAULT_FILTER};

/// Initialise logging once; later calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
