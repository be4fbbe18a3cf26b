//! Process-wide logging setup shared by the engine binaries.

/// Subscriber configuration (format, filters).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, UnknownLogFormat};

/// Initialize logging from the environment.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    self::tracing::init(&LogConfig::from_env());
}
