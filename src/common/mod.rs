//! Common types, traits, and utilities shared across the package, mashup,
//! model and project modules.
//!
//! Everything here is format-agnostic: little-endian readers, text encodings,
//! byte-order marks, XML escaping and the memoizing decode cell.

// Submodule declarations
pub mod binary;
pub mod bom;
pub mod encoding;
pub mod error;
pub mod memo;
pub mod xml;

// Re-exports for convenience
pub use error::{Error, Result};
pub use memo::{DecodeState, Memo};
