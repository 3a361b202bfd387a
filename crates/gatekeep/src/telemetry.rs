//! Log output setup.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`.
///
/// Returns `false` if a global subscriber was already installed (by the
/// host application or an earlier call); the existing one stays.
pub fn init_tracing() -> bool {
    init_tracing_with("info")
}

/// Like [`init_tracing`], with an explicit fallback filter used when
/// `RUST_LOG` is unset or invalid, e.g. `"gatekeep=debug,info"`.
pub fn init_tracing_with(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
