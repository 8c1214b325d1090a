//! # Bus Facade
//!
//! [`VanBus`] owns everything with a lifetime: the timing constants, the
//! packet ring, the counters, the decoder, and the line HAL. The
//! application talks to the bus exclusively through it.
//!
//! Two ways in:
//!
//! - [`VanBus::setup`] / [`VanBus::setup_transceiver`] (feature
//!   `raspberry-pi`) claim real pins and route GPIO edge interrupts into
//!   the decoder. The interrupt thread is this crate's producer context.
//! - [`VanBus::with_hal`] attaches any [`VanHal`] — the simulated bus in
//!   tests, or a no-op clock for offline trace replay — and edges are
//!   fed through [`VanBus::inject_edge`].
//!
//! On hosted platforms the decoder sits behind a mutex standing in for
//! the interrupt masking real silicon would use; the packet ring itself
//! stays lock-free, so the consumer never stalls the edge source while
//! draining packets.

use std::io;
use std::sync::{Arc, Mutex};

use crate::constants::{
    DEFAULT_MAX_TX_RETRIES, DEFAULT_QUEUE_CAPACITY, DEFAULT_TOLERANCE_PERCENT,
    VAN_COMFORT_BIT_RATE,
};
use crate::error::VanError;
use crate::hal::VanHal;
use crate::logging::log_error;
use crate::van::decoder::EdgeDecoder;
use crate::van::frame::{AckState, ComFlags, Packet, StatusFlags};
use crate::van::queue::PacketQueue;
use crate::van::stats::{BusCounters, BusStats};
use crate::van::timing::BitTiming;
use crate::van::transmitter;

/// Setup-time configuration: defaults, then `with_*` adjustments.
#[derive(Debug, Clone)]
pub struct VanConfig {
    /// Rate of the HAL's cycle counter
    pub clock_hz: u64,
    /// Wire bit rate
    pub bit_rate: u32,
    /// Edge classification window, percent of one bit time
    pub tolerance_percent: u8,
    /// Packet ring depth
    pub queue_capacity: usize,
    /// Retry bound after arbitration loss
    pub max_tx_retries: u8,
}

impl Default for VanConfig {
    fn default() -> Self {
        Self {
            clock_hz: 1_000_000_000,
            bit_rate: VAN_COMFORT_BIT_RATE,
            tolerance_percent: DEFAULT_TOLERANCE_PERCENT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_tx_retries: DEFAULT_MAX_TX_RETRIES,
        }
    }
}

impl VanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock_hz(mut self, clock_hz: u64) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    pub fn with_tolerance_percent(mut self, percent: u8) -> Self {
        self.tolerance_percent = percent;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_tx_retries(mut self, retries: u8) -> Self {
        self.max_tx_retries = retries;
        self
    }
}

/// The VAN bus handle: receiver, statistics, and (when a TX pin is
/// configured) transmitter.
pub struct VanBus<H: VanHal> {
    hal: H,
    timing: BitTiming,
    config: VanConfig,
    queue: Arc<PacketQueue>,
    counters: Arc<BusCounters>,
    decoder: Arc<Mutex<EdgeDecoder>>,
    tx_configured: bool,
}

impl<H: VanHal> VanBus<H> {
    /// Attach a receive-only bus to an arbitrary HAL.
    pub fn with_hal(hal: H, config: VanConfig) -> Result<Self, VanError> {
        Self::build(hal, config, false)
    }

    /// Attach a transceiver to an arbitrary HAL.
    pub fn with_hal_transceiver(hal: H, config: VanConfig) -> Result<Self, VanError> {
        Self::build(hal, config, true)
    }

    fn build(hal: H, config: VanConfig, tx: bool) -> Result<Self, VanError> {
        let timing = BitTiming::new(config.clock_hz, config.bit_rate, config.tolerance_percent)?;
        let queue = Arc::new(PacketQueue::new(config.queue_capacity)?);
        let counters = Arc::new(BusCounters::new());
        let decoder = Arc::new(Mutex::new(EdgeDecoder::new(
            timing,
            Arc::clone(&queue),
            Arc::clone(&counters),
        )));

        Ok(Self {
            hal,
            timing,
            config,
            queue,
            counters,
            decoder,
            tx_configured: tx,
        })
    }

    /// Feed one line edge into the decoder.
    ///
    /// This is the entry point for offline trace replay and simulation;
    /// on real pins the interrupt handler installed at setup performs
    /// the equivalent call.
    pub fn inject_edge(&mut self, level: bool, at_cycles: u64) {
        match self.decoder.lock() {
            Ok(mut decoder) => decoder.on_edge(level, at_cycles),
            Err(_) => log_error("VAN decoder state poisoned, edge dropped"),
        }
    }

    /// Whether a packet is waiting.
    ///
    /// Also gives the decoder a chance to finalize a frame whose tail
    /// ended in line silence.
    pub fn available(&mut self) -> bool {
        self.poll_decoder();
        self.queue.available()
    }

    /// Pop the oldest packet into `pkt`.
    ///
    /// Returns whether a packet was consumed. `overrun` reports that at
    /// least one frame was lost to a full ring since the previously
    /// delivered packet.
    pub fn receive(&mut self, pkt: &mut Packet, overrun: &mut bool) -> bool {
        self.poll_decoder();
        match self.queue.pop() {
            Some(popped) => {
                *overrun = popped.status.contains(StatusFlags::QUEUE_OVERRUN);
                *pkt = popped;
                true
            }
            None => {
                *overrun = false;
                false
            }
        }
    }

    /// Attempt single-bit repair on a CRC-flagged packet, keeping the
    /// repair counter honest.
    pub fn check_and_repair(&self, pkt: &mut Packet) -> bool {
        let ok = pkt.check_and_repair();
        if pkt.status.contains(StatusFlags::REPAIRED) {
            self.counters.note_repaired();
        }
        ok
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        self.counters.snapshot()
    }

    /// Render the counter table to `w`.
    pub fn dump_stats<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        self.counters.snapshot().dump(w)
    }

    /// Send a frame, blocking until it is on the wire or abandoned.
    pub fn sync_send_packet(
        &mut self,
        iden: u16,
        com: ComFlags,
        data: &[u8],
    ) -> Result<AckState, VanError> {
        if !self.tx_configured {
            return Err(VanError::TxNotConfigured);
        }
        transmitter::sync_send(
            &mut self.hal,
            &self.timing,
            &self.counters,
            iden,
            com,
            data,
            self.config.max_tx_retries,
        )
    }

    /// The calibrated timing constants.
    pub fn timing(&self) -> &BitTiming {
        &self.timing
    }

    /// Direct access to the HAL (simulation scripting, trace replay).
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    fn poll_decoder(&mut self) {
        let now = self.hal.cycles();
        if let Ok(mut decoder) = self.decoder.lock() {
            decoder.poll(now);
        }
    }
}

#[cfg(feature = "raspberry-pi")]
mod pi {
    use super::*;
    use crate::hal::raspberry_pi::{RaspberryPiHal, PI_CLOCK_HZ};

    impl VanBus<RaspberryPiHal> {
        /// Claim `rx_pin` and start receiving.
        pub fn setup(rx_pin: u8) -> Result<Self, VanError> {
            Self::setup_pins(rx_pin, None)
        }

        /// Claim `rx_pin` and `tx_pin` and start as a transceiver.
        pub fn setup_transceiver(rx_pin: u8, tx_pin: u8) -> Result<Self, VanError> {
            Self::setup_pins(rx_pin, Some(tx_pin))
        }

        fn setup_pins(rx_pin: u8, tx_pin: Option<u8>) -> Result<Self, VanError> {
            let config = VanConfig::default().with_clock_hz(PI_CLOCK_HZ);
            let hal = RaspberryPiHal::new(rx_pin, tx_pin)?;
            let mut bus = Self::build(hal, config, tx_pin.is_some())?;

            let decoder = Arc::clone(&bus.decoder);
            bus.hal.install_edge_handler(move |level, now| {
                match decoder.lock() {
                    Ok(mut d) => d.on_edge(level, now),
                    Err(_) => log_error("VAN decoder state poisoned, edge dropped"),
                }
            })?;

            Ok(bus)
        }
    }
}
