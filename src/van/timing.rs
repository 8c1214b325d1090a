//! # Bit-Time Calibration
//!
//! Derives the cycle constants the decoder and transmitter share from the
//! platform clock and the nominal wire bit rate. Everything here is
//! computed once at setup; the hot paths only do integer compares.
//!
//! The comfort bus runs at 125 kbit/s, so one bit time is 8 µs. Between
//! two observed edges the line held one level for some whole number of
//! bit times; `classify` recovers that count, tolerating clock drift and
//! interrupt latency through a configurable acceptance window around each
//! multiple (±25 % of a bit time by default, tightened to ±15 % on
//! platforms with jittery edge timestamps).

use crate::constants::{
    DEFAULT_TOLERANCE_PERCENT, VAN_COMFORT_BIT_RATE, VAN_IFS_SLOTS, VAN_MAX_RUN_SLOTS,
};
use crate::error::VanError;

/// Outcome of classifying the gap between two consecutive line edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClass {
    /// Shorter than half a bit time: electrical noise, not a bit.
    Glitch,
    /// The line held its level for `slots` bit times. `in_window` is
    /// false when the gap rounded to `slots` but fell outside the
    /// acceptance window, which the decoder records as a double
    /// transition on the frame in progress.
    Run { slots: u32, in_window: bool },
    /// Longer than any legal same-level run: inter-frame silence.
    Gap,
}

/// Cycle constants shared by receiver and transmitter.
///
/// Immutable after construction; both hot paths read it without
/// synchronisation.
#[derive(Debug, Clone, Copy)]
pub struct BitTiming {
    cycles_per_bit: u64,
    tolerance_cycles: u64,
}

impl BitTiming {
    /// Calibrate from the platform clock rate and the wire bit rate.
    pub fn new(clock_hz: u64, bit_rate: u32, tolerance_percent: u8) -> Result<Self, VanError> {
        if bit_rate == 0 {
            return Err(VanError::InvalidConfig("bit_rate must be non-zero".into()));
        }
        if clock_hz < bit_rate as u64 * 4 {
            return Err(VanError::InvalidConfig(format!(
                "clock of {clock_hz} Hz cannot resolve {bit_rate} bit/s"
            )));
        }
        if tolerance_percent == 0 || tolerance_percent > 45 {
            return Err(VanError::InvalidConfig(format!(
                "tolerance of {tolerance_percent}% is outside 1..=45"
            )));
        }

        let cycles_per_bit = clock_hz / bit_rate as u64;
        Ok(Self {
            cycles_per_bit,
            tolerance_cycles: cycles_per_bit * tolerance_percent as u64 / 100,
        })
    }

    /// Calibrate for the comfort bus with the default window.
    pub fn comfort_bus(clock_hz: u64) -> Result<Self, VanError> {
        Self::new(clock_hz, VAN_COMFORT_BIT_RATE, DEFAULT_TOLERANCE_PERCENT)
    }

    /// Cycles per wire bit.
    #[inline]
    pub fn cycles_per_bit(&self) -> u64 {
        self.cycles_per_bit
    }

    /// Classify the cycles between two consecutive edges.
    #[inline]
    pub fn classify(&self, delta_cycles: u64) -> SlotClass {
        let slots = (delta_cycles + self.cycles_per_bit / 2) / self.cycles_per_bit;
        if slots == 0 {
            return SlotClass::Glitch;
        }
        if slots > VAN_MAX_RUN_SLOTS as u64 {
            return SlotClass::Gap;
        }

        let nominal = slots * self.cycles_per_bit;
        let jitter = nominal.abs_diff(delta_cycles);
        SlotClass::Run {
            slots: slots as u32,
            in_window: jitter <= self.tolerance_cycles,
        }
    }

    /// Cycles of recessive line required before a transmitter may drive
    /// (one full inter-frame gap).
    #[inline]
    pub fn ifs_cycles(&self) -> u64 {
        self.cycles_per_bit * VAN_IFS_SLOTS as u64
    }

    /// Cycles of silence after which a frame in its tail states is
    /// considered finished.
    #[inline]
    pub fn idle_cycles(&self) -> u64 {
        self.cycles_per_bit * (VAN_MAX_RUN_SLOTS as u64 + 1)
    }
}
