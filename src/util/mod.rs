//! # Utility Modules
//!
//! Common helpers used throughout the VAN implementation: hex formatting
//! for packet dumps and trace files, and rate-limited logging for hot
//! paths.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, HexError};
pub use logging::LogThrottle;
