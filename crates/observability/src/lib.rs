//! Tracing/logging setup shared by binaries and test harnesses.

/// Initialize process-wide tracing in the format named by `BODEGA_LOG_FORMAT`
/// (JSON when unset).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, init_with};
