//! # Bus Statistics
//!
//! Counters shared between the edge pump and the application. The pump
//! only ever increments; the application reads single counters with
//! relaxed loads. Tearing between counters in a snapshot is acceptable —
//! these are display values, not synchronisation state (the queue's own
//! indices carry the correctness-critical ordering).

use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

/// Live counters, incremented from the receive and transmit paths.
#[derive(Debug, Default)]
pub struct BusCounters {
    /// Frames published to the ring
    frames: AtomicU32,
    /// Published frames whose CRC did not match
    crc_errors: AtomicU32,
    /// Frames restored by single-bit repair on the consumer side
    repaired: AtomicU32,
    /// Frames dropped because the ring was full at start-of-frame
    overruns: AtomicU32,
    /// Frames aborted by framing faults mid-air
    dropped: AtomicU32,
    /// Sub-bit edges discarded as electrical noise
    glitches: AtomicU32,
    /// Edge gaps that fell outside the classification window
    double_transitions: AtomicU32,
    /// Frames put on the wire by the transmitter
    tx_frames: AtomicU32,
    /// Arbitration losses across all send attempts
    arbitration_losses: AtomicU32,
}

impl BusCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn note_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_repaired(&self) {
        self.repaired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_glitch(&self) {
        self.glitches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_double_transition(&self) {
        self.double_transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_tx_frame(&self) {
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn note_arbitration_loss(&self) {
        self.arbitration_losses.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters out for display or export.
    pub fn snapshot(&self) -> BusStats {
        BusStats {
            frames: self.frames.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            repaired: self.repaired.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            glitches: self.glitches.load(Ordering::Relaxed),
            double_transitions: self.double_transitions.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            arbitration_losses: self.arbitration_losses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the bus counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BusStats {
    pub frames: u32,
    pub crc_errors: u32,
    pub repaired: u32,
    pub overruns: u32,
    pub dropped: u32,
    pub glitches: u32,
    pub double_transitions: u32,
    pub tx_frames: u32,
    pub arbitration_losses: u32,
}

impl BusStats {
    /// Render the counter table to a writer.
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "van bus statistics")?;
        writeln!(w, "  frames received ....... {}", self.frames)?;
        writeln!(w, "  crc errors ............ {}", self.crc_errors)?;
        writeln!(w, "  repaired .............. {}", self.repaired)?;
        writeln!(w, "  queue overruns ........ {}", self.overruns)?;
        writeln!(w, "  dropped frames ........ {}", self.dropped)?;
        writeln!(w, "  glitch edges .......... {}", self.glitches)?;
        writeln!(w, "  double transitions .... {}", self.double_transitions)?;
        writeln!(w, "  frames transmitted .... {}", self.tx_frames)?;
        writeln!(w, "  arbitration losses .... {}", self.arbitration_losses)?;
        Ok(())
    }
}
