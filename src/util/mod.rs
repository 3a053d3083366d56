//! # Utility Modules
//!
//! Small helpers shared across the crate.

pub mod hex;

pub use hex::format_hex_compact;
