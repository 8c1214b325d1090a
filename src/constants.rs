//! VAN Protocol Constants
//!
//! This module defines constants used in the VAN comfort-bus implementation,
//! based on the ISO 11519-3 framing used by PSA vehicles.

/// Nominal comfort-bus bit rate in bits per second
pub const VAN_COMFORT_BIT_RATE: u32 = 125_000;

/// Start-of-frame byte, transmitted in the same 5-slot framing as data
pub const VAN_SOF_BYTE: u8 = 0x0E;

/// Start-of-frame pattern as it appears on the wire (10 time slots)
pub const VAN_SOF_SLOTS: u16 = 0b0000_1_1110_1;

/// Number of time slots in the start-of-frame pattern
pub const VAN_SOF_SLOT_COUNT: u8 = 10;

/// Width of the frame identifier in bits
pub const VAN_IDEN_BITS: u8 = 12;

/// Mask for the 12-bit identifier
pub const VAN_IDEN_MASK: u16 = 0x0FFF;

/// Width of the COM (command) field in bits
pub const VAN_COM_BITS: u8 = 4;

/// Hard upper bound on payload length, fixed by the frame format
pub const VAN_MAX_DATA_BYTES: usize = 28;

/// Width of the frame check sequence in bits
pub const VAN_CRC_BITS: u8 = 15;

/// Mask for the 15-bit CRC
pub const VAN_CRC_MASK: u16 = 0x7FFF;

/// Payload bits per time-slot group (a group is 4 bits plus one Manchester slot)
pub const VAN_NIBBLE_BITS: u8 = 4;

/// Time slots per framed nibble group
pub const VAN_GROUP_SLOTS: u8 = 5;

/// Dominant time slots forming the end-of-data marker
pub const VAN_EOD_SLOTS: u8 = 2;

/// Time slots in the in-frame acknowledgement window
pub const VAN_ACK_SLOTS: u8 = 2;

/// Recessive time slots separating frames (end-of-frame / inter-frame gap)
pub const VAN_IFS_SLOTS: u8 = 8;

/// Longest legal run of identical time slots on a live frame.
///
/// Nibble framing bounds in-body runs at 5 slots; the dominant run across
/// the CRC tail, EOD, and a pulled ACK slot reaches 7. Anything longer is
/// silence: frame end or a framing fault, depending on decoder state.
pub const VAN_MAX_RUN_SLOTS: u32 = 8;

/// Default depth of the received-packet ring
pub const DEFAULT_QUEUE_CAPACITY: usize = 15;

/// Smallest supported packet ring
pub const MIN_QUEUE_CAPACITY: usize = 4;

/// Default bound on transmit retries after losing arbitration
pub const DEFAULT_MAX_TX_RETRIES: u8 = 3;

/// Default edge-classification acceptance window, percent of one bit time
pub const DEFAULT_TOLERANCE_PERCENT: u8 = 25;

/// Nibbles occupied by the header (IDEN + COM) in the decoded stream
pub const VAN_HEADER_NIBBLES: usize = 4;

/// Nibbles occupied by the frame check sequence field (15-bit CRC shifted
/// left once, low bit zero)
pub const VAN_CRC_FIELD_NIBBLES: usize = 4;

/// Largest number of nibbles a frame body can carry between SOF and EOD
pub const VAN_MAX_BODY_NIBBLES: usize =
    VAN_HEADER_NIBBLES + 2 * VAN_MAX_DATA_BYTES + VAN_CRC_FIELD_NIBBLES;

/// Upper bound on time slots in a complete outgoing frame, SOF through EOD
pub const VAN_MAX_FRAME_SLOTS: usize =
    VAN_SOF_SLOT_COUNT as usize + VAN_MAX_BODY_NIBBLES * VAN_GROUP_SLOTS as usize + 1;
