//! Shared value types and the crate error taxonomy.

/// Frame ranges.
pub mod core;
/// Error type and result alias.
pub mod error;
