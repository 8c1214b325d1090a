//! # van-rs - A Rust Crate for PSA VAN Comfort-Bus Communication
//!
//! The van-rs crate provides a software receiver/transmitter for the
//! Vehicle Area Network (VAN) comfort bus used in PSA-group automobiles
//! (Peugeot, Citroën). It turns the single-wire bus into a queue of
//! framed, CRC-checked packets — and, in the opposite direction,
//! arbitrates for the bus and emits well-formed frames bit-by-bit from a
//! general-purpose GPIO pin, without dedicated VAN silicon.
//!
//! ## Features
//!
//! - Edge-interrupt bit decoding of the 125 kbit/s time-stretched
//!   Manchester line, tolerant of clock drift
//! - Frame reassembly with 15-bit CRC verification and optional
//!   single-bit repair
//! - Lock-free bounded packet queue from interrupt to application
//!   context
//! - Synchronous transmitter with bus arbitration, collision detection,
//!   and bounded retries
//! - Raspberry Pi GPIO support behind the `raspberry-pi` feature, and a
//!   deterministic simulated line for tests and offline tooling
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! To use the van-rs crate in your Rust project, add the following to
//! your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! van-rs = "1.0"
//! ```
//!
//! Then, in your Rust code, you can import the necessary modules and
//! functions:
//!
//! ```rust
//! use van_rs::{
//!     VanBus, VanConfig, Packet, ComFlags, AckState, VanError,
//!     init_logger, log_info,
//! };
//! ```
//!
//! A receive loop on real pins looks like this (Raspberry Pi feature):
//!
//! ```rust,ignore
//! let mut bus = VanBus::setup_transceiver(17, 27)?;
//! let mut pkt = Packet::default();
//! let mut overrun = false;
//! loop {
//!     while bus.receive(&mut pkt, &mut overrun) {
//!         println!("{pkt}");
//!     }
//! }
//! ```

pub mod constants;
pub mod error;
pub mod hal;
pub mod logging;
pub mod util;
pub mod van;

pub use crate::error::VanError;
pub use crate::logging::{init_logger, log_info};

// Core VAN types
pub use hal::sim::SimBus;
pub use hal::VanHal;
pub use van::frame::{AckState, ComFlags, Packet, StatusFlags};
pub use van::receiver::{VanBus, VanConfig};
pub use van::stats::BusStats;
pub use van::timing::BitTiming;

#[cfg(feature = "raspberry-pi")]
pub use hal::raspberry_pi::RaspberryPiHal;
