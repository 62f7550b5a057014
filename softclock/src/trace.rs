//! Logging for the scheduler and the clock threads.
//!
//! Built with `--features tracing`, the `trace!`..`error!` macros used across
//! the crate are the `tracing` ones. Without it they compile away.
//!
//! | Level | Emitted for |
//! |-------|-------------|
//! | trace | bind, release, schedule, cancel |
//! | debug | timers fired late, clock thread spawn and join |
//! | info  | clock start and stop |
//! | warn  | hard thread falling behind real time |
//! | error | use of an unbound handle, panicking callbacks, spawn failures |

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default
/// `softclock=trace`), with thread names so hard and soft thread output can be
/// told apart.
///
/// Safe to call more than once; only the first call installs anything. Does
/// nothing without the `tracing` feature.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(concat!(env!("CARGO_PKG_NAME"), "=trace")));
    let layer = fmt::layer()
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    // Fails only when a global subscriber is already set.
    let _ = tracing_subscriber::registry().with(layer).with(filter).try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

// Without the feature every level expands to nothing; arguments are not
// evaluated.
#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use discard as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as warn;
