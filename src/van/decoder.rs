//! # Edge-Driven Frame Decoder
//!
//! This module turns raw line edges into published packet descriptors.
//! It is the crate's interrupt path: on real hardware `on_edge` runs in
//! the GPIO interrupt context, so it never blocks, never allocates, and
//! never calls out of the module — it classifies, flags, and advances.
//!
//! ## How decoding works
//!
//! The line idles recessive. Between two edges the level was constant,
//! so the cycle gap divided by the bit time gives a run of identical
//! bits ([`BitTiming::classify`]). Runs feed a frame state machine:
//!
//! 1. `Idle` — a 10-slot shift register hunts for the start-of-frame
//!    pattern.
//! 2. `Body` — uniform 5-slot groups: 4 payload bits plus a Manchester
//!    slot carrying the complement of the 4th. A dominant level in a
//!    Manchester slot that should have been recessive is the end-of-data
//!    violation.
//! 3. `EodSecond` — the violation's companion dominant slot.
//! 4. `AckWait` — the two-slot acknowledgement window; any dominant
//!    level in it means some listener acknowledged.
//!
//! Frame length is not transmitted. Body nibbles therefore flow through
//! a 4-nibble delay line: when EOD arrives, the nibbles still inside it
//! are the CRC field, and everything that came out before was header and
//! payload. The running CRC is updated as bytes leave the delay line, so
//! verification at EOD is a single compare.
//!
//! A run longer than [`VAN_MAX_RUN_SLOTS`] is silence: it finalizes a
//! frame that has reached EOD and aborts one that has not. Frames that
//! end in silence with no further traffic are finalized by [`poll`],
//! which the facade invokes from `available`/`receive` and the edge pump
//! invokes on its poll timeout.
//!
//! [`poll`]: EdgeDecoder::poll
//! [`VAN_MAX_RUN_SLOTS`]: crate::constants::VAN_MAX_RUN_SLOTS

use std::sync::Arc;

use crate::constants::{VAN_MAX_DATA_BYTES, VAN_SOF_SLOTS};
use crate::van::crc::Crc15;
use crate::van::frame::{AckState, ComFlags, Packet, StatusFlags};
use crate::van::queue::{PacketQueue, ProduceHandle};
use crate::van::stats::BusCounters;
use crate::van::timing::{BitTiming, SlotClass};

/// Frame progress, in strict wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    /// Hunting for start-of-frame
    Idle,
    /// Collecting 5-slot groups: IDEN, COM, data, CRC field
    Body,
    /// Saw the Manchester violation, expecting its companion slot
    EodSecond,
    /// Inside the acknowledgement window
    AckWait,
}

/// The interrupt-context half of the receiver.
///
/// Owns all per-frame decoding state plus the producer side of the
/// packet ring. The facade hands the edge source a reference at setup
/// and never moves it afterwards.
pub struct EdgeDecoder {
    timing: BitTiming,
    queue: Arc<PacketQueue>,
    counters: Arc<BusCounters>,

    // edge bookkeeping
    synced: bool,
    last_edge: u64,
    prev_level: bool,

    // frame state
    state: FrameState,
    sof_window: u16,

    // body accumulation
    group_pos: u8,
    nibble_acc: u8,
    last_bit: bool,
    delay: [u8; 4],
    delay_len: u8,
    popped: usize,
    byte_hi: u8,
    crc: Crc15,

    // production
    current: Packet,
    reservation: Option<ProduceHandle>,
    overrun_pending: bool,
    seq: u32,
}

impl EdgeDecoder {
    pub fn new(timing: BitTiming, queue: Arc<PacketQueue>, counters: Arc<BusCounters>) -> Self {
        Self {
            timing,
            queue,
            counters,
            synced: false,
            last_edge: 0,
            prev_level: true,
            state: FrameState::Idle,
            sof_window: 0x3FF,
            group_pos: 0,
            nibble_acc: 0,
            last_bit: true,
            delay: [0; 4],
            delay_len: 0,
            popped: 0,
            byte_hi: 0,
            crc: Crc15::new(),
            current: Packet::default(),
            reservation: None,
            overrun_pending: false,
            seq: 0,
        }
    }

    /// Process one line edge.
    ///
    /// `level` is the line level after the transition, `now` the cycle
    /// counter at the transition. Edges must arrive in order; the caller
    /// guarantees the method is never re-entered.
    pub fn on_edge(&mut self, level: bool, now: u64) {
        if !self.synced {
            self.synced = true;
            self.last_edge = now;
            self.prev_level = level;
            return;
        }

        let delta = now.wrapping_sub(self.last_edge);

        #[cfg(feature = "isr-debug")]
        if self.state != FrameState::Idle {
            self.current.edge_trace.record(delta);
        }

        match self.timing.classify(delta) {
            SlotClass::Glitch => {
                // Sub-bit pulse: ignore it entirely. Its partner edge
                // restores the level, and measuring from the older edge
                // keeps the surrounding run intact.
                self.counters.note_glitch();
                return;
            }
            SlotClass::Run { slots, in_window } => {
                if !in_window {
                    self.counters.note_double_transition();
                    if self.state != FrameState::Idle {
                        self.current.status.insert(StatusFlags::DOUBLE_TRANSITION);
                    }
                }
                let held = self.prev_level;
                for _ in 0..slots {
                    self.process_bit(held);
                }
            }
            SlotClass::Gap => {
                self.on_gap();
            }
        }

        self.last_edge = now;
        self.prev_level = level;
    }

    /// Finalize a frame that ended in silence.
    ///
    /// Called from consumer context between frames (and by the edge pump
    /// on its poll timeout); only acts once the line has been quiet for
    /// longer than any legal run.
    pub fn poll(&mut self, now: u64) {
        if !self.synced || self.state == FrameState::Idle {
            return;
        }
        if now.wrapping_sub(self.last_edge) > self.timing.idle_cycles() {
            self.on_gap();
            self.last_edge = now;
        }
    }

    /// Wire-arrival sequence number of the next published packet.
    pub fn next_seq(&self) -> u32 {
        self.seq
    }

    fn process_bit(&mut self, bit: bool) {
        match self.state {
            FrameState::Idle => {
                self.sof_window = ((self.sof_window << 1) | bit as u16) & 0x3FF;
                if self.sof_window == VAN_SOF_SLOTS {
                    self.begin_frame();
                }
            }
            FrameState::Body => {
                if self.group_pos < 4 {
                    self.nibble_acc = (self.nibble_acc << 1) | bit as u8;
                    self.last_bit = bit;
                    self.group_pos += 1;
                } else if bit != self.last_bit {
                    // valid Manchester slot closes the group
                    self.push_body_nibble(self.nibble_acc & 0x0F);
                    self.nibble_acc = 0;
                    self.group_pos = 0;
                } else if !bit {
                    // dominant violation: end of data
                    self.push_body_nibble(self.nibble_acc & 0x0F);
                    self.nibble_acc = 0;
                    self.group_pos = 0;
                    self.state = FrameState::EodSecond;
                } else {
                    // recessive where a transition was mandatory: the
                    // frame lost its framing entirely
                    self.abort_frame();
                }
            }
            FrameState::EodSecond => {
                if !bit {
                    self.state = FrameState::AckWait;
                    self.group_pos = 0;
                } else {
                    // truncated EOD; salvage the frame but say so
                    self.current.status.insert(StatusFlags::NO_EOD);
                    self.state = FrameState::AckWait;
                    self.group_pos = 0;
                    self.process_bit(bit);
                }
            }
            FrameState::AckWait => {
                if !bit {
                    self.current.ack = AckState::Acked;
                }
                self.group_pos += 1;
                if self.group_pos >= crate::constants::VAN_ACK_SLOTS {
                    self.finish_frame();
                }
            }
        }
    }

    /// Silence handling, by state.
    fn on_gap(&mut self) {
        match self.state {
            FrameState::Idle => {
                self.sof_window = 0x3FF;
            }
            FrameState::Body => {
                // dead air inside the body is unrecoverable
                self.abort_frame();
            }
            FrameState::EodSecond => {
                if self.prev_level {
                    self.current.status.insert(StatusFlags::NO_EOD);
                }
                self.finish_frame();
            }
            FrameState::AckWait => {
                if !self.prev_level {
                    self.current.ack = AckState::Acked;
                }
                self.finish_frame();
            }
        }
    }

    /// Start-of-frame: reserve a ring slot and reset per-frame state.
    fn begin_frame(&mut self) {
        self.reservation = self.queue.try_acquire();
        if self.reservation.is_none() {
            // ring full: the frame is decoded into the scratch
            // descriptor and dropped; the overrun is stamped on the
            // next packet that gets through
            self.counters.note_overrun();
            self.overrun_pending = true;
        }

        self.current = Packet::default();
        #[cfg(feature = "isr-debug")]
        self.current.edge_trace.clear();
        self.crc = Crc15::new();
        self.group_pos = 0;
        self.nibble_acc = 0;
        self.delay_len = 0;
        self.popped = 0;
        self.state = FrameState::Body;
    }

    /// One completed body nibble enters the delay line; the nibble it
    /// displaces is header or payload.
    fn push_body_nibble(&mut self, nibble: u8) {
        if self.delay_len < 4 {
            self.delay[self.delay_len as usize] = nibble;
            self.delay_len += 1;
            return;
        }

        let out = self.delay[0];
        self.delay.rotate_left(1);
        self.delay[3] = nibble;

        if self.popped % 2 == 0 {
            self.byte_hi = out;
        } else {
            let byte = (self.byte_hi << 4) | out;
            self.crc.update(byte);
            self.route_byte(self.popped / 2, byte);
        }
        self.popped += 1;
    }

    /// Assign a completed byte to its field.
    fn route_byte(&mut self, index: usize, byte: u8) {
        match index {
            0 => self.current.iden = (byte as u16) << 4,
            1 => {
                self.current.iden |= (byte >> 4) as u16;
                self.current.com = ComFlags::from_bits_truncate(byte & 0x0F);
            }
            _ => {
                let pos = index - 2;
                if pos < VAN_MAX_DATA_BYTES {
                    self.current.data[pos] = byte;
                    self.current.data_len = (pos + 1) as u8;
                } else {
                    self.current.status.insert(StatusFlags::MAX_LEN_EXCEEDED);
                }
            }
        }
    }

    /// EOD reached: resolve the CRC field, derive flags, publish.
    fn finish_frame(&mut self) {
        // fewer nibbles than IDEN+COM+CRC cannot be a frame
        if self.delay_len < 4 || self.popped < 4 {
            self.abort_frame();
            return;
        }

        if self.popped % 2 != 0 {
            // half a byte of payload: framing slipped somewhere
            self.current.status.insert(StatusFlags::NO_EOD);
            // drop the dangling nibble so the CRC field still lines up
            self.popped -= 1;
        }

        let field = ((self.delay[0] as u16) << 12)
            | ((self.delay[1] as u16) << 8)
            | ((self.delay[2] as u16) << 4)
            | self.delay[3] as u16;
        if field & 1 != 0 {
            self.current.status.insert(StatusFlags::NO_EOD);
        }
        self.current.crc = field >> 1;

        if self.crc.finish() != self.current.crc {
            self.current.status.insert(StatusFlags::CRC_ERROR);
        }

        if self.current.ack != AckState::Acked {
            if self.current.com.contains(ComFlags::ACK_REQUESTED) {
                self.current.ack = AckState::NotAcked;
                self.current.status.insert(StatusFlags::NO_ACK);
            } else {
                self.current.ack = AckState::NoAckExpected;
            }
        }

        if let Some(handle) = self.reservation.take() {
            if self.overrun_pending {
                self.current.status.insert(StatusFlags::QUEUE_OVERRUN);
                self.overrun_pending = false;
            }
            self.current.seq_no = self.seq;
            self.seq = self.seq.wrapping_add(1);

            self.counters.note_frame();
            if self.current.status.contains(StatusFlags::CRC_ERROR) {
                self.counters.note_crc_error();
            }
            self.queue.publish(handle, &self.current);
        }
        // without a reservation the frame was scratch-decoded and is
        // dropped here; the overrun was already counted at SOF

        self.reset_to_idle();
    }

    /// Fatal framing fault: count it, release the slot, resynchronise.
    fn abort_frame(&mut self) {
        self.counters.note_dropped();
        if let Some(handle) = self.reservation.take() {
            self.queue.abandon(handle);
        }
        self.reset_to_idle();
    }

    fn reset_to_idle(&mut self) {
        self.state = FrameState::Idle;
        self.sof_window = 0x3FF;
        self.group_pos = 0;
        self.nibble_acc = 0;
        self.delay_len = 0;
        self.popped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_QUEUE_CAPACITY;
    use crate::van::encoding::edges_from_slots;
    use crate::van::frame::build_frame_slots;

    fn harness() -> (EdgeDecoder, Arc<PacketQueue>, Arc<BusCounters>, BitTiming) {
        let timing = BitTiming::new(1_000_000, 125_000, 25).unwrap();
        let queue = Arc::new(PacketQueue::new(DEFAULT_QUEUE_CAPACITY).unwrap());
        let counters = Arc::new(BusCounters::new());
        let decoder = EdgeDecoder::new(timing, Arc::clone(&queue), Arc::clone(&counters));
        (decoder, queue, counters, timing)
    }

    fn play(decoder: &mut EdgeDecoder, timing: &BitTiming, slots: &[bool], start: u64) -> u64 {
        for edge in edges_from_slots(slots, timing, start) {
            decoder.on_edge(edge.level, edge.at);
        }
        start + slots.len() as u64 * timing.cycles_per_bit()
    }

    #[test]
    fn test_decodes_simple_frame() {
        let (mut decoder, queue, _, timing) = harness();
        let slots = build_frame_slots(0x8A4, ComFlags::READ, &[0x0F, 0x07]);

        // establish the idle reference, then the frame
        decoder.on_edge(true, 0);
        let end = play(&mut decoder, &timing, &slots, 1_000);
        decoder.poll(end + timing.idle_cycles() + 1);

        let pkt = queue.pop().expect("frame should publish");
        assert_eq!(pkt.iden, 0x8A4);
        assert_eq!(pkt.com, ComFlags::READ);
        assert_eq!(pkt.data(), &[0x0F, 0x07]);
        assert!(pkt.crc_ok());
        assert_eq!(pkt.ack, AckState::NoAckExpected);
    }

    #[test]
    fn test_glitch_edges_are_ignored() {
        let (mut decoder, queue, counters, timing) = harness();
        let slots = build_frame_slots(0x524, ComFlags::READ, &[0xAA]);

        decoder.on_edge(true, 0);
        let mut at = 1_000;
        let cpb = timing.cycles_per_bit();
        for edge in edges_from_slots(&slots, &timing, at) {
            decoder.on_edge(edge.level, edge.at);
            at = edge.at;
        }
        // inject a noise pulse well after the frame settled
        decoder.on_edge(false, at + 1);
        decoder.on_edge(true, at + 2);
        decoder.poll(at + cpb * 20);

        assert!(counters.snapshot().glitches >= 1);
        let pkt = queue.pop().expect("glitch must not kill the frame");
        assert_eq!(pkt.iden, 0x524);
        assert!(pkt.crc_ok());
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let (mut decoder, queue, _, timing) = harness();
        decoder.on_edge(true, 0);
        let mut at = 1_000;
        for iden in [0x8A4u16, 0x524, 0x564] {
            let slots = build_frame_slots(iden, ComFlags::READ, &[]);
            at = play(&mut decoder, &timing, &slots, at);
            at += timing.ifs_cycles() + timing.cycles_per_bit() * 4;
        }
        decoder.poll(at + timing.idle_cycles() + 1);

        for expect in 0..3u32 {
            assert_eq!(queue.pop().unwrap().seq_no, expect);
        }
    }
}
