//! Domain layer.
//!
//! Pure types and logic with no I/O dependencies: price records and the
//! merge rules, and the subscriber registry.

/// Price records and merge rules.
pub mod price;

/// Symbol → listener registry.
pub mod subscription;
