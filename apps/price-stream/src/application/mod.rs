//! Application layer.
//!
//! Port definitions for the external price sources and the price stream
//! service built on top of them.

/// Transport and data-source ports.
pub mod ports;

/// Application services.
pub mod services;
