//! Process-wide logging setup.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::from_env());
}
