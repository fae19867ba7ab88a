//! Tracing/logging setup shared by every clinicops process.

pub mod tracing;

pub use crate::tracing::{LogFormat, ObservabilityConfig, UnknownLogFormat};

/// Initialize process-wide tracing from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize process-wide tracing with explicit settings.
pub fn init_with(config: &ObservabilityConfig) {
    tracing::init_with(config);
}
