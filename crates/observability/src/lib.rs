//! Process-wide tracing setup shared by the binaries and integration tests.

/// Initialize tracing with the defaults (`RUST_LOG`, falling back to `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env(), "info");
}

/// Tracing configuration (filters, output format).
pub mod tracing;
