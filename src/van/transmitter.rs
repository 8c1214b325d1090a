//! # Frame Transmitter
//!
//! Puts a frame on the wire bit-by-bit from a GPIO pin, with no help
//! from dedicated bus silicon. The send is synchronous: the caller
//! blocks (busy-waiting, never sleeping) until the frame is out or the
//! retry budget is gone.
//!
//! ## Arbitration
//!
//! The bus is wired-AND, so driving recessive while another node drives
//! dominant leaves the line dominant. Each time slot is driven at its
//! start and the line sampled at three quarters of the slot; reading
//! dominant where we drove recessive means a higher-priority frame (a
//! numerically lower IDEN, compared MSB-first) owns the bus. We release
//! immediately, wait out the intruder, and try again. Collisions during
//! SOF cannot be observed — both frames drive identical slots there —
//! so losses surface from the first differing IDEN bit on, which is
//! exactly the arbitration window.

use crate::constants::{VAN_ACK_SLOTS, VAN_MAX_DATA_BYTES};
use crate::error::VanError;
use crate::hal::VanHal;
use crate::logging::{log_debug, log_warn};
use crate::van::frame::{build_frame_slots, AckState, ComFlags};
use crate::van::stats::BusCounters;
use crate::van::timing::BitTiming;

/// Send one frame, blocking until it is on the wire or abandoned.
///
/// Returns the acknowledgement outcome on success. Losing arbitration
/// more than `max_retries` times returns
/// [`VanError::ArbitrationLost`].
pub fn sync_send<H: VanHal>(
    hal: &mut H,
    timing: &BitTiming,
    counters: &BusCounters,
    iden: u16,
    com: ComFlags,
    data: &[u8],
    max_retries: u8,
) -> Result<AckState, VanError> {
    if data.len() > VAN_MAX_DATA_BYTES {
        return Err(VanError::DataTooLong(data.len()));
    }

    let slots = build_frame_slots(iden, com, data);

    for attempt in 0..=max_retries {
        wait_for_idle(hal, timing);

        if drive_slots(hal, timing, &slots) {
            let ack = sample_ack_window(hal, timing, com);
            counters.note_tx_frame();
            return Ok(ack);
        }

        counters.note_arbitration_loss();
        log_debug(&format!(
            "arbitration lost for IDEN {iden:03X} (attempt {attempt})"
        ));
    }

    log_warn(&format!(
        "send of IDEN {iden:03X} abandoned after {max_retries} retries"
    ));
    Err(VanError::ArbitrationLost {
        retries: max_retries,
    })
}

/// Block until the line has been recessive for a full inter-frame gap.
///
/// Traffic appearing during the wait restarts it; the receive path
/// keeps decoding that traffic through its own edge source.
fn wait_for_idle<H: VanHal>(hal: &mut H, timing: &BitTiming) {
    let step = timing.cycles_per_bit() / 4;
    let mut idle_since: Option<u64> = None;

    loop {
        let now = hal.cycles();
        if hal.read_rx() {
            let since = *idle_since.get_or_insert(now);
            if now.wrapping_sub(since) >= timing.ifs_cycles() {
                return;
            }
        } else {
            idle_since = None;
        }
        hal.spin_until(now + step);
    }
}

/// Drive the waveform slot-by-slot, sensing for collisions.
///
/// Returns false on arbitration loss (line already released).
fn drive_slots<H: VanHal>(hal: &mut H, timing: &BitTiming, slots: &[bool]) -> bool {
    let cpb = timing.cycles_per_bit();
    let start = hal.cycles();

    for (i, &slot) in slots.iter().enumerate() {
        let slot_start = start + i as u64 * cpb;
        hal.spin_until(slot_start);
        hal.drive_tx(slot);
        hal.spin_until(slot_start + cpb * 3 / 4);
        if slot && !hal.read_rx() {
            hal.release_tx();
            return false;
        }
    }

    hal.spin_until(start + slots.len() as u64 * cpb);
    hal.release_tx();
    true
}

/// Sample the two-slot acknowledgement window after EOD.
fn sample_ack_window<H: VanHal>(hal: &mut H, timing: &BitTiming, com: ComFlags) -> AckState {
    let cpb = timing.cycles_per_bit();
    let window_start = hal.cycles();
    let mut pulled = false;

    for i in 0..VAN_ACK_SLOTS as u64 {
        hal.spin_until(window_start + i * cpb + cpb * 3 / 4);
        pulled |= !hal.read_rx();
    }
    hal.spin_until(window_start + VAN_ACK_SLOTS as u64 * cpb);

    if pulled {
        AckState::Acked
    } else if com.contains(ComFlags::ACK_REQUESTED) {
        AckState::NotAcked
    } else {
        AckState::NoAckExpected
    }
}
