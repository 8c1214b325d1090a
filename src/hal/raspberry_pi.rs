//! # Raspberry Pi GPIO HAL
//!
//! Drives the VAN line through a pair of GPIO pins via `rppal`: the RX
//! pin listens to the transceiver's receive output, the optional TX pin
//! drives its transmit input (dominant = low, matching an
//! open-collector stage onto the wired-AND bus).
//!
//! The cycle counter is the monotonic clock at nanosecond resolution,
//! so timing constants are calibrated with a 1 GHz virtual clock. That
//! leaves ~8000 "cycles" per bit at 125 kbit/s — coarse scheduling
//! jitter lands well inside the receiver's classification window, while
//! the transmitter simply loses arbitration more often on a loaded
//! system (a degradation the retry bound absorbs).

use std::time::Instant;

use log::info;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};

use crate::hal::{HalError, VanHal};

/// Cycle rate of the nanosecond clock backing [`RaspberryPiHal`].
pub const PI_CLOCK_HZ: u64 = 1_000_000_000;

/// GPIO-backed line access for Raspberry Pi.
pub struct RaspberryPiHal {
    t0: Instant,
    rx: InputPin,
    tx: Option<OutputPin>,
}

impl RaspberryPiHal {
    /// Claim the RX pin (and TX pin, for a transceiver) in BCM
    /// numbering.
    pub fn new(rx_pin: u8, tx_pin: Option<u8>) -> Result<Self, HalError> {
        let gpio = Gpio::new().map_err(|e| HalError::Init(e.to_string()))?;

        let rx = gpio
            .get(rx_pin)
            .map_err(|_| HalError::Pin(rx_pin))?
            .into_input_pullup();

        let tx = match tx_pin {
            Some(pin) => {
                let mut out = gpio.get(pin).map_err(|_| HalError::Pin(pin))?.into_output();
                out.set_high(); // recessive until the first send
                Some(out)
            }
            None => None,
        };

        info!(
            "VAN line on GPIO{rx_pin}{}",
            tx_pin.map(|p| format!(" / GPIO{p}")).unwrap_or_default()
        );

        Ok(Self {
            t0: Instant::now(),
            rx,
            tx,
        })
    }

    /// Whether a TX pin was claimed.
    pub fn has_tx(&self) -> bool {
        self.tx.is_some()
    }

    /// Install `handler` on every RX edge.
    ///
    /// The handler receives the post-edge level and the cycle counter,
    /// and runs on the GPIO interrupt thread — this is the crate's
    /// interrupt context, so the handler must follow interrupt
    /// discipline (no blocking, no allocation).
    pub fn install_edge_handler<F>(&mut self, mut handler: F) -> Result<(), HalError>
    where
        F: FnMut(bool, u64) + Send + 'static,
    {
        let t0 = self.t0;
        self.rx
            .set_async_interrupt(Trigger::Both, move |level: Level| {
                let now = t0.elapsed().as_nanos() as u64;
                handler(level == Level::High, now);
            })
            .map_err(|e| HalError::Interrupt(e.to_string()))
    }
}

impl VanHal for RaspberryPiHal {
    fn cycles(&mut self) -> u64 {
        self.t0.elapsed().as_nanos() as u64
    }

    fn spin_until(&mut self, target: u64) {
        while self.cycles() < target {
            std::hint::spin_loop();
        }
    }

    fn read_rx(&mut self) -> bool {
        self.rx.read() == Level::High
    }

    fn drive_tx(&mut self, level: bool) {
        if let Some(tx) = self.tx.as_mut() {
            if level {
                tx.set_high();
            } else {
                tx.set_low();
            }
        }
    }

    fn release_tx(&mut self) {
        if let Some(tx) = self.tx.as_mut() {
            tx.set_high();
        }
    }
}
