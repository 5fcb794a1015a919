//! Telemetry Module
//!
//! Structured logging setup for the price stream service.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter directives (default: `price_stream=info`)

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with environment filter.
///
/// Uses a static directive string that is a compile-time constant
/// guaranteed to parse. Safe to call once per process; subsequent calls
/// are ignored.
#[allow(clippy::expect_used)]
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive(
        "price_stream=info"
            .parse()
            .expect("static directive 'price_stream=info' is valid"),
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
