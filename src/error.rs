//! # VAN Error Handling
//!
//! This module defines the VanError enum, which represents the different error
//! types that can occur in the van-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the VAN crate.
#[derive(Debug, Error)]
pub enum VanError {
    /// Indicates a GPIO pin number that the platform cannot provide.
    #[error("Invalid GPIO pin: {0}")]
    InvalidPin(u8),

    /// Indicates a failure in the underlying GPIO layer.
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Indicates a send attempt on a bus that was set up receive-only.
    #[error("Transmitter not configured")]
    TxNotConfigured,

    /// Indicates arbitration was lost on every attempt.
    #[error("Arbitration lost after {retries} retries")]
    ArbitrationLost { retries: u8 },

    /// Indicates a payload longer than the frame format allows.
    #[error("Payload of {0} bytes exceeds the 28-byte frame limit")]
    DataTooLong(usize),

    /// Indicates a configuration value outside its supported range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A catch‑all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}
