//! Application services.

/// The per-symbol price streaming service.
pub mod price_stream;

/// Fixed-delay retry policy for the streaming transport.
pub mod retry;
