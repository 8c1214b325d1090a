//! # VAN Frame Handling
//!
//! This module defines the packet descriptor delivered to the
//! application, the COM and status flag sets, and the assembly of an
//! outgoing frame into its on-wire time-slot waveform.
//!
//! ## Frame Structure
//!
//! A comfort-bus frame occupies the following time slots on the wire:
//!
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────────┬──────────────┬─────┬─────┬─────┐
//! │  SOF     │  IDEN     │  COM     │  DATA        │  CRC field   │ EOD │ ACK │ EOF │
//! │  (10 TS) │  (15 TS)  │  (5 TS)  │  (10 TS/byte)│  (19 TS)     │(2TS)│(2TS)│(8TS)│
//! └──────────┴───────────┴──────────┴──────────────┴──────────────┴─────┴─────┴─────┘
//! ```
//!
//! Every 4 payload bits carry a fifth Manchester slot; the CRC field is
//! the 15-bit CRC shifted left once, and its final Manchester slot is
//! replaced by the EOD violation. Frame length is not transmitted: EOD
//! alone marks where the data stops and the trailing 16 bits were the
//! CRC field.

use std::fmt;

use bitflags::bitflags;

use crate::constants::{VAN_CRC_MASK, VAN_IDEN_MASK, VAN_MAX_DATA_BYTES};
use crate::van::crc::{calculate_van_crc, check_and_repair, verify_van_crc, RepairOutcome};
use crate::van::encoding::{push_crc_and_eod, push_nibble, push_sof};

bitflags! {
    /// The 4-bit COM field, MSB first on the wire.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ComFlags: u8 {
        /// Read (as opposed to write) transfer
        const READ = 0b1000;
        /// In-frame acknowledgement requested
        const ACK_REQUESTED = 0b0100;
        /// Remote acknowledgement
        const RAK = 0b0010;
        /// Remote transmission request
        const RTR = 0b0001;
    }
}

bitflags! {
    /// Per-packet condition flags raised by the receive path.
    ///
    /// Flags never cause the receiver to withhold a packet (queue
    /// overrun excepted, where there is no slot to deliver); discarding
    /// flagged frames is the consumer's decision.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// A frame before this one was dropped because the ring was full
        const QUEUE_OVERRUN = 1 << 0;
        /// The received CRC does not match the frame contents
        const CRC_ERROR = 1 << 1;
        /// An edge gap fell outside the classification window
        const DOUBLE_TRANSITION = 1 << 2;
        /// The end-of-data marker was malformed or missing
        const NO_EOD = 1 << 3;
        /// An acknowledgement was requested but nobody pulled the line
        const NO_ACK = 1 << 4;
        /// The frame carried more than 28 data bytes; payload truncated
        const MAX_LEN_EXCEEDED = 1 << 5;
        /// A single-bit repair was applied; the CRC now holds
        const REPAIRED = 1 << 6;
    }
}

/// What the acknowledgement window showed for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckState {
    /// A listener pulled the line inside the ACK slot
    Acked,
    /// An acknowledgement was requested but the slot stayed recessive
    NotAcked,
    /// The COM flags did not request an acknowledgement
    #[default]
    NoAckExpected,
}

/// Raw edge-timing capture attached to each slot for protocol forensics.
///
/// Gated behind the `isr-debug` feature: it roughly quadruples the slot
/// size and is only useful for post-morteming malformed frames.
#[cfg(feature = "isr-debug")]
#[derive(Debug, Clone, Copy)]
pub struct EdgeTrace {
    /// Cycle gaps between consecutive edges, oldest first
    pub deltas: [u32; Self::CAPACITY],
    /// Number of valid entries in `deltas`
    pub len: u8,
}

#[cfg(feature = "isr-debug")]
impl EdgeTrace {
    pub const CAPACITY: usize = 96;

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn record(&mut self, delta: u64) {
        if (self.len as usize) < Self::CAPACITY {
            self.deltas[self.len as usize] = delta.min(u32::MAX as u64) as u32;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.deltas[..self.len as usize]
    }
}

#[cfg(feature = "isr-debug")]
impl Default for EdgeTrace {
    fn default() -> Self {
        Self {
            deltas: [0; Self::CAPACITY],
            len: 0,
        }
    }
}

/// One received frame, exactly one ring slot.
///
/// Fixed-size and `Copy`: descriptors live in the preallocated ring and
/// hand-off to the application is a copy, never a pointer transfer.
#[derive(Debug, Clone, Copy)]
pub struct Packet {
    /// Monotonic counter assigned when the slot is published
    pub seq_no: u32,
    /// 12-bit frame identifier
    pub iden: u16,
    /// COM field
    pub com: ComFlags,
    /// Payload bytes; only `data_len` of them are valid
    pub data: [u8; VAN_MAX_DATA_BYTES],
    /// Number of valid payload bytes
    pub data_len: u8,
    /// The 15-bit CRC as read from the wire
    pub crc: u16,
    /// Acknowledgement outcome
    pub ack: AckState,
    /// Condition flags raised while receiving
    pub status: StatusFlags,
    /// Raw edge timing of the frame
    #[cfg(feature = "isr-debug")]
    pub edge_trace: EdgeTrace,
}

impl Default for Packet {
    fn default() -> Self {
        Self {
            seq_no: 0,
            iden: 0,
            com: ComFlags::empty(),
            data: [0; VAN_MAX_DATA_BYTES],
            data_len: 0,
            crc: 0,
            ack: AckState::default(),
            status: StatusFlags::default(),
            #[cfg(feature = "isr-debug")]
            edge_trace: EdgeTrace::default(),
        }
    }
}

impl Packet {
    /// The valid payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_len as usize]
    }

    /// Whether the frame contents match the received CRC.
    pub fn crc_ok(&self) -> bool {
        !self.status.contains(StatusFlags::CRC_ERROR)
    }

    /// Recompute the CRC over the descriptor fields and compare.
    pub fn verify_crc(&self) -> bool {
        verify_van_crc(self.iden, self.com.bits(), self.data(), self.crc)
    }

    /// Try to repair a CRC-flagged frame by flipping one bit.
    ///
    /// On success the descriptor fields hold the restored frame,
    /// `REPAIRED` is set, and `CRC_ERROR` is cleared. Returns whether the
    /// packet now passes its CRC.
    pub fn check_and_repair(&mut self) -> bool {
        if !self.status.contains(StatusFlags::CRC_ERROR) {
            return true;
        }

        let mut com = self.com.bits();
        let len = self.data_len as usize;
        let outcome = check_and_repair(&mut self.iden, &mut com, &mut self.data[..len], &mut self.crc);
        match outcome {
            RepairOutcome::AlreadyValid => {
                self.status.remove(StatusFlags::CRC_ERROR);
                true
            }
            RepairOutcome::Repaired => {
                self.com = ComFlags::from_bits_truncate(com);
                self.status.remove(StatusFlags::CRC_ERROR);
                self.status.insert(StatusFlags::REPAIRED);
                true
            }
            RepairOutcome::Unrepairable => false,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<6} IDEN={:03X} COM={:X} len={:2} crc={:04X} [{}]",
            self.seq_no,
            self.iden,
            self.com.bits(),
            self.data_len,
            self.crc,
            crate::util::hex::format_hex_compact(self.data()),
        )?;
        if !self.status.is_empty() {
            write!(f, " flags={:?}", self.status)?;
        }
        write!(f, " ack={:?}", self.ack)
    }
}

/// Assemble the on-wire waveform of a frame, SOF through EOD.
///
/// The ACK window and EOF are not part of the returned slots: the
/// transmitter releases the line for them.
pub fn build_frame_slots(iden: u16, com: ComFlags, data: &[u8]) -> Vec<bool> {
    debug_assert!(data.len() <= VAN_MAX_DATA_BYTES);
    let iden = iden & VAN_IDEN_MASK;

    let mut slots = Vec::with_capacity(crate::constants::VAN_MAX_FRAME_SLOTS);
    push_sof(&mut slots);
    push_nibble(&mut slots, (iden >> 8) as u8);
    push_nibble(&mut slots, ((iden >> 4) & 0x0F) as u8);
    push_nibble(&mut slots, (iden & 0x0F) as u8);
    push_nibble(&mut slots, com.bits());
    for &byte in data {
        crate::van::encoding::push_byte(&mut slots, byte);
    }
    push_crc_and_eod(&mut slots, calculate_van_crc(iden, com.bits(), data) & VAN_CRC_MASK);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{VAN_SOF_SLOTS, VAN_SOF_SLOT_COUNT};

    #[test]
    fn test_frame_starts_with_sof() {
        let slots = build_frame_slots(0x8A4, ComFlags::READ, &[]);
        let sof: u16 = slots[..VAN_SOF_SLOT_COUNT as usize]
            .iter()
            .fold(0, |acc, &b| (acc << 1) | b as u16);
        assert_eq!(sof, VAN_SOF_SLOTS);
    }

    #[test]
    fn test_frame_slot_count() {
        // SOF 10 + IDEN 15 + COM 5 + 2 data bytes 20 + CRC field/EOD 21
        let slots = build_frame_slots(0x524, ComFlags::READ, &[0xAB, 0xCD]);
        assert_eq!(slots.len(), 71);
    }

    #[test]
    fn test_packet_repair_clears_crc_error() {
        let data = [0x0F, 0x07];
        let mut pkt = Packet {
            iden: 0x8A4,
            com: ComFlags::READ,
            data_len: 2,
            crc: calculate_van_crc(0x8A4, ComFlags::READ.bits(), &data),
            status: StatusFlags::CRC_ERROR,
            ..Packet::default()
        };
        pkt.data[..2].copy_from_slice(&data);
        pkt.data[1] ^= 0x04;

        assert!(!pkt.verify_crc());
        assert!(pkt.check_and_repair());
        assert_eq!(pkt.data(), &data);
        assert!(pkt.status.contains(StatusFlags::REPAIRED));
        assert!(pkt.crc_ok());
    }
}
