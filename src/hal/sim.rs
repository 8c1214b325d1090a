//! # Simulated Bus Line
//!
//! A deterministic, virtual-time implementation of [`VanHal`] for tests
//! and offline tooling. The simulated wire is wired-AND: it reads
//! dominant whenever any attached driver holds it dominant, which is
//! exactly the electrical property arbitration depends on.
//!
//! Time only advances inside `spin_until`, so every run of a test is
//! bit-identical. Peer transmitters are scripted as slot waveforms with
//! a start cycle; the local driver's level changes are journaled so the
//! complete wire history can be replayed through a decoder afterwards —
//! the way the transmitter tests verify what actually went on the wire.

use crate::hal::VanHal;
use crate::van::encoding::Edge;
use crate::van::timing::BitTiming;

/// A scripted remote transmitter.
#[derive(Debug, Clone)]
struct Peer {
    start: u64,
    cycles_per_bit: u64,
    slots: Vec<bool>,
}

impl Peer {
    fn level_at(&self, now: u64) -> bool {
        if now < self.start {
            return true;
        }
        let slot = ((now - self.start) / self.cycles_per_bit) as usize;
        self.slots.get(slot).copied().unwrap_or(true)
    }
}

/// Virtual-time wired-AND bus.
pub struct SimBus {
    now: u64,
    peers: Vec<Peer>,
    /// Journal of local drive changes: (cycle, driven level or released)
    drive_log: Vec<(u64, Option<bool>)>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            now: 0,
            peers: Vec::new(),
            drive_log: vec![(0, None)],
        }
    }

    /// Script a remote transmitter that starts driving `slots` at cycle
    /// `start`.
    pub fn add_peer_frame(&mut self, start: u64, timing: &BitTiming, slots: Vec<bool>) {
        self.peers.push(Peer {
            start,
            cycles_per_bit: timing.cycles_per_bit(),
            slots,
        });
    }

    /// Advance virtual time without touching the line.
    pub fn advance(&mut self, cycles: u64) {
        self.now += cycles;
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.now
    }

    fn local_level_at(&self, now: u64) -> bool {
        let mut level = None;
        for &(at, drive) in &self.drive_log {
            if at > now {
                break;
            }
            level = drive;
        }
        level.unwrap_or(true)
    }

    /// The wire level at an arbitrary cycle: AND of every driver.
    pub fn line_at(&self, now: u64) -> bool {
        let peers = self.peers.iter().all(|p| p.level_at(now));
        peers && self.local_level_at(now)
    }

    /// Reconstruct the edge stream a receiver attached to the wire
    /// would have seen over `[from, to)`.
    pub fn wire_edges(&self, from: u64, to: u64) -> Vec<Edge> {
        let mut edges = Vec::new();
        let mut level = true;
        let mut at = from;
        while at < to {
            let l = self.line_at(at);
            if l != level {
                edges.push(Edge { at, level: l });
                level = l;
            }
            at += 1;
        }
        edges
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl VanHal for SimBus {
    fn cycles(&mut self) -> u64 {
        self.now
    }

    fn spin_until(&mut self, target: u64) {
        if target > self.now {
            self.now = target;
        }
    }

    fn read_rx(&mut self) -> bool {
        self.line_at(self.now)
    }

    fn drive_tx(&mut self, level: bool) {
        self.drive_log.push((self.now, Some(level)));
    }

    fn release_tx(&mut self) {
        self.drive_log.push((self.now, None));
    }
}
