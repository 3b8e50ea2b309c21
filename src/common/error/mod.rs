//! Unified error types for pbixproj.
//!
//! This module provides one error type for every layer of the crate, from
//! container parsing up to folder synchronization, so callers can decide per
//! variant whether to skip a part or abort the whole extraction.

// Submodule declarations
pub mod conversions;
pub mod types;

// Re-exports
pub use types::{Error, Result};
