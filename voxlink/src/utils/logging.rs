use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "voxlink=debug,voxlink_lib=debug,warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging with tracing
///
/// This function sets up the tracing subscriber with the following configuration:
/// - Reads filter from RUST_LOG environment variable if available
/// - Falls back to [`DEFAULT_FILTER`] if RUST_LOG is not set
/// - Uses a formatted output layer
///
/// Panics if a global subscriber is already installed; use
/// [`try_init_logging`] where that can happen.
///
/// # Example
///
/// ```no_run
/// use voxlink_lib::utils::logging::init_logging;
///
/// init_logging();
/// ```
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter())
        .init();

    tracing::info!("Voxlink logging initialized");
}

/// Initialize logging unless a subscriber is already installed
///
/// Returns `true` when this call installed the subscriber.
pub fn try_init_logging() -> bool {
    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(env_filter())
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Voxlink logging initialized");
    }
    installed
}
