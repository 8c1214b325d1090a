//! # Hardware Abstraction Layer for the Bus Line
//!
//! This module defines the HAL trait the transmitter and facade are
//! written against, and provides platform implementations: real GPIO
//! pins on Raspberry Pi and a deterministic simulated line for tests.
//!
//! The trait is deliberately infallible: the operations inside a
//! bit-timed drive loop (read a level, set a level, busy-wait) have no
//! useful failure mode at 8 µs per bit. Anything that can fail —
//! claiming pins, installing interrupts — fails at setup time and
//! surfaces through [`HalError`].

use thiserror::Error;

/// Errors that can occur while setting up a platform HAL
#[derive(Debug, Error)]
pub enum HalError {
    #[error("GPIO initialization failed: {0}")]
    Init(String),

    #[error("GPIO pin {0} unavailable")]
    Pin(u8),

    #[error("Interrupt setup failed: {0}")]
    Interrupt(String),
}

impl From<HalError> for crate::error::VanError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::Pin(pin) => crate::error::VanError::InvalidPin(pin),
            other => crate::error::VanError::Gpio(other.to_string()),
        }
    }
}

/// Cycle-accurate access to the bus line.
///
/// `cycles` is a monotonic counter in the clock domain the
/// [`BitTiming`](crate::van::timing::BitTiming) constants were computed
/// for. `spin_until` busy-waits — it must not yield to the OS or sleep,
/// since one bit is only 8 µs worth of cycles.
pub trait VanHal {
    /// Current value of the cycle counter.
    fn cycles(&mut self) -> u64;

    /// Busy-wait until the cycle counter reaches `target`.
    fn spin_until(&mut self, target: u64);

    /// Sampled level of the receive line (`true` = recessive).
    fn read_rx(&mut self) -> bool;

    /// Drive the transmit line to `level`.
    fn drive_tx(&mut self, level: bool);

    /// Stop driving; the line returns to recessive unless another node
    /// holds it dominant.
    fn release_tx(&mut self);
}

pub mod sim;

#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi;

pub use sim::SimBus;

#[cfg(feature = "raspberry-pi")]
pub use raspberry_pi::RaspberryPiHal;
