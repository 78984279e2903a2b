//! Diagnostic logging setup.
//!
//! The storage core only emits `tracing` events; installing a subscriber is
//! left to the embedding process. [`init`] is a convenience for binaries,
//! tests and benchmarks.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Setting this variable (to any value) lowers the default level to `debug`.
pub const DEBUG_ENV: &str = "SLOTSTORE_DEBUG";

static INIT: Once = Once::new();

/// Default filter directive when `RUST_LOG` is not set
pub fn default_level() -> &'static str {
    if std::env::var_os(DEBUG_ENV).is_some() {
        "debug"
    } else {
        "info"
    }
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over [`DEBUG_ENV`]. Safe to call any number
/// of times; only the first call has an effect, and an already-installed
/// global subscriber is left in place.
pub fn init() {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(default_level())
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    });
}
