//! Tests for the arbitrating transmitter on the simulated wired-AND
//! line: clean sends, collision retries, retry exhaustion, and the
//! send-path error cases.

use van_rs::van::decoder::EdgeDecoder;
use van_rs::van::frame::build_frame_slots;
use van_rs::van::queue::PacketQueue;
use van_rs::van::stats::BusCounters;
use van_rs::{AckState, BitTiming, ComFlags, Packet, SimBus, VanBus, VanConfig, VanError};

use std::sync::Arc;

const SIM_CLOCK_HZ: u64 = 1_000_000; // 8 cycles per bit

fn sim_config() -> VanConfig {
    VanConfig::default().with_clock_hz(SIM_CLOCK_HZ)
}

fn timing() -> BitTiming {
    BitTiming::new(SIM_CLOCK_HZ, 125_000, 25).unwrap()
}

/// Decode everything that went over the simulated wire.
fn decode_wire(sim: &SimBus, upto: u64) -> Vec<Packet> {
    let timing = timing();
    let queue = Arc::new(PacketQueue::new(15).unwrap());
    let counters = Arc::new(BusCounters::new());
    let mut decoder = EdgeDecoder::new(timing, Arc::clone(&queue), Arc::clone(&counters));

    decoder.on_edge(true, 0);
    for edge in sim.wire_edges(0, upto) {
        decoder.on_edge(edge.level, edge.at);
    }
    decoder.poll(upto + timing.idle_cycles() * 2);

    let mut out = Vec::new();
    while let Some(pkt) = queue.pop() {
        out.push(pkt);
    }
    out
}

#[test]
fn test_clean_send_puts_frame_on_wire() {
    let mut bus = VanBus::with_hal_transceiver(SimBus::new(), sim_config()).unwrap();
    let data = [0x0F, 0x07, 0x00, 0x00, 0x00, 0x00, 0x60];

    let ack = bus.sync_send_packet(0x8A4, ComFlags::READ, &data).unwrap();
    assert_eq!(ack, AckState::NoAckExpected);

    let upto = bus.hal_mut().now() + 100;
    let pkts = decode_wire(bus.hal_mut(), upto);
    assert_eq!(pkts.len(), 1);
    assert_eq!(pkts[0].iden, 0x8A4);
    assert_eq!(pkts[0].data(), &data);
    assert!(pkts[0].crc_ok());

    let stats = bus.stats();
    assert_eq!(stats.tx_frames, 1);
    assert_eq!(stats.arbitration_losses, 0);
}

#[test]
fn test_send_requires_tx_configuration() {
    let mut bus = VanBus::with_hal(SimBus::new(), sim_config()).unwrap();
    match bus.sync_send_packet(0x8A4, ComFlags::READ, &[0x01]) {
        Err(VanError::TxNotConfigured) => {}
        other => panic!("expected TxNotConfigured, got {other:?}"),
    }
}

#[test]
fn test_send_rejects_oversized_payload() {
    let mut bus = VanBus::with_hal_transceiver(SimBus::new(), sim_config()).unwrap();
    let data = [0u8; 29];
    match bus.sync_send_packet(0x8A4, ComFlags::READ, &data) {
        Err(VanError::DataTooLong(29)) => {}
        other => panic!("expected DataTooLong, got {other:?}"),
    }
}

#[test]
fn test_retry_exhaustion_returns_arbitration_lost() {
    let timing = timing();
    let mut sim = SimBus::new();

    // A higher-priority talker occupies every idle window we will see:
    // each of our attempts starts one inter-frame gap after the
    // previous peer frame ends, and the peer's own start lands a
    // quarter-bit sampling step later, inside our SOF.
    let peer = build_frame_slots(0x124, ComFlags::READ, &[]);
    let peer_cycles = peer.len() as u64 * timing.cycles_per_bit();
    let skew = timing.cycles_per_bit() / 4;
    let mut start = timing.ifs_cycles() + skew;
    for _ in 0..5 {
        sim.add_peer_frame(start, &timing, peer.clone());
        start += peer_cycles + timing.ifs_cycles() + skew;
    }

    let mut bus = VanBus::with_hal_transceiver(sim, sim_config()).unwrap();
    match bus.sync_send_packet(0x8A4, ComFlags::READ, &[0x0F]) {
        Err(VanError::ArbitrationLost { retries: 3 }) => {}
        other => panic!("expected ArbitrationLost, got {other:?}"),
    }
    assert_eq!(bus.stats().arbitration_losses, 4);
    assert_eq!(bus.stats().tx_frames, 0);
}

#[test]
fn test_zero_retries_config_gives_single_attempt() {
    let timing = timing();
    let mut sim = SimBus::new();
    let peer = build_frame_slots(0x124, ComFlags::READ, &[]);
    let skew = timing.cycles_per_bit() / 4;
    sim.add_peer_frame(timing.ifs_cycles() + skew, &timing, peer);

    let config = sim_config().with_max_tx_retries(0);
    let mut bus = VanBus::with_hal_transceiver(sim, config).unwrap();
    match bus.sync_send_packet(0x8A4, ComFlags::READ, &[]) {
        Err(VanError::ArbitrationLost { retries: 0 }) => {}
        other => panic!("expected ArbitrationLost, got {other:?}"),
    }
    assert_eq!(bus.stats().arbitration_losses, 1);
}

#[test]
fn test_ack_pull_reported_to_sender() {
    let timing = timing();
    let mut sim = SimBus::new();

    // a listener pulls the first acknowledgement slot of our frame;
    // the frame occupies [ifs, ifs + frame), the ACK window follows it
    let frame = build_frame_slots(0x8A4, ComFlags::READ | ComFlags::ACK_REQUESTED, &[0x42]);
    let frame_end = timing.ifs_cycles() + frame.len() as u64 * timing.cycles_per_bit();
    sim.add_peer_frame(frame_end, &timing, vec![false]);

    let mut bus = VanBus::with_hal_transceiver(sim, sim_config()).unwrap();
    let ack = bus
        .sync_send_packet(0x8A4, ComFlags::READ | ComFlags::ACK_REQUESTED, &[0x42])
        .unwrap();
    assert_eq!(ack, AckState::Acked);
}

#[test]
fn test_missing_ack_reported_when_requested() {
    let mut bus = VanBus::with_hal_transceiver(SimBus::new(), sim_config()).unwrap();
    let ack = bus
        .sync_send_packet(0x8A4, ComFlags::READ | ComFlags::ACK_REQUESTED, &[0x42])
        .unwrap();
    assert_eq!(ack, AckState::NotAcked);
}
