//! Tracing/logging setup shared by every binary in the workspace.

/// Initialize process-wide logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{ENV_LOG_FORMAT, LogFormat};
