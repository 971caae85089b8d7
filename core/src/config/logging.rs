//! Tracing subscriber setup
//!
//! Verbosity comes from `RUST_LOG` when set, otherwise from the provided
//! default directive. Call once, before the server starts.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once in tests; subsequent calls are no-ops.
pub fn init_tracing(default_directive: &str) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_directive))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.try_init();
}
