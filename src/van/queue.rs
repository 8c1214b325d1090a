//! # Received-Packet Ring
//!
//! Bounded single-producer/single-consumer queue of packet descriptors.
//! The producer is the edge pump (interrupt context on real hardware),
//! the consumer is the application loop. Neither side ever blocks,
//! spins, or allocates: slots are preallocated, and a slot changes hands
//! through one Release store of its `full` flag, matched by an Acquire
//! load on the other side.
//!
//! A slot is reserved when a start-of-frame is recognised and published
//! when the frame completes. If no slot is free at start-of-frame the
//! frame is decoded into the producer's scratch descriptor and dropped;
//! the overrun is stamped on the next packet that does get through.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::constants::MIN_QUEUE_CAPACITY;
use crate::error::VanError;
use crate::van::frame::Packet;

struct Slot {
    full: AtomicBool,
    pkt: UnsafeCell<Packet>,
}

/// Reservation of the slot at the producer index.
///
/// Must be resolved with [`PacketQueue::publish`] or
/// [`PacketQueue::abandon`] before the next reservation.
#[derive(Debug)]
#[must_use]
pub struct ProduceHandle {
    index: u32,
}

/// Fixed-capacity SPSC ring of packet descriptors.
pub struct PacketQueue {
    slots: Box<[Slot]>,
    /// Next slot the producer will reserve (monotonic)
    head: AtomicU32,
    /// Next slot the consumer will inspect (monotonic)
    tail: AtomicU32,
}

// One producer context and one consumer context access disjoint slots,
// synchronised per-slot through the `full` flag.
unsafe impl Sync for PacketQueue {}
unsafe impl Send for PacketQueue {}

impl PacketQueue {
    /// Allocate a ring with `capacity` slots.
    pub fn new(capacity: usize) -> Result<Self, VanError> {
        if capacity < MIN_QUEUE_CAPACITY {
            return Err(VanError::InvalidConfig(format!(
                "queue capacity {capacity} is below the minimum of {MIN_QUEUE_CAPACITY}"
            )));
        }

        let slots = (0..capacity)
            .map(|_| Slot {
                full: AtomicBool::new(false),
                pkt: UnsafeCell::new(Packet::default()),
            })
            .collect();

        Ok(Self {
            slots,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Producer: reserve the slot at the head index.
    ///
    /// Returns `None` when the consumer has not yet released that slot,
    /// which is the queue-overrun condition.
    pub fn try_acquire(&self) -> Option<ProduceHandle> {
        let index = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[index as usize % self.slots.len()];
        if slot.full.load(Ordering::Acquire) {
            return None;
        }
        self.head.store(index.wrapping_add(1), Ordering::Relaxed);
        Some(ProduceHandle { index })
    }

    /// Producer: fill the reserved slot and publish it.
    ///
    /// The descriptor copy happens before the single Release store that
    /// makes the slot visible to the consumer.
    pub fn publish(&self, handle: ProduceHandle, pkt: &Packet) {
        let slot = &self.slots[handle.index as usize % self.slots.len()];
        // Sole producer, slot not yet full: exclusive access holds.
        unsafe {
            *slot.pkt.get() = *pkt;
        }
        slot.full.store(true, Ordering::Release);
    }

    /// Producer: give a reservation back without publishing (frame
    /// aborted mid-air).
    pub fn abandon(&self, handle: ProduceHandle) {
        // Reservations resolve in order, so rolling the head back cannot
        // skip a published slot.
        self.head.store(handle.index, Ordering::Relaxed);
    }

    /// Consumer: whether a packet is ready at the tail.
    pub fn available(&self) -> bool {
        let index = self.tail.load(Ordering::Relaxed);
        self.slots[index as usize % self.slots.len()]
            .full
            .load(Ordering::Acquire)
    }

    /// Consumer: copy out the packet at the tail and release its slot.
    pub fn pop(&self) -> Option<Packet> {
        let index = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[index as usize % self.slots.len()];
        if !slot.full.load(Ordering::Acquire) {
            return None;
        }
        // The Acquire above pairs with the producer's Release: the
        // descriptor fields are fully visible.
        let pkt = unsafe { *slot.pkt.get() };
        slot.full.store(false, Ordering::Release);
        self.tail.store(index.wrapping_add(1), Ordering::Relaxed);
        Some(pkt)
    }

    /// Occupancy by modular index comparison. Display value only.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        !self.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_QUEUE_CAPACITY;

    fn packet(seq: u32) -> Packet {
        Packet {
            seq_no: seq,
            iden: 0x5E4,
            ..Packet::default()
        }
    }

    #[test]
    fn test_capacity_floor() {
        assert!(PacketQueue::new(3).is_err());
        assert!(PacketQueue::new(MIN_QUEUE_CAPACITY).is_ok());
    }

    #[test]
    fn test_fifo_order() {
        let q = PacketQueue::new(DEFAULT_QUEUE_CAPACITY).unwrap();
        for seq in 0..5 {
            let h = q.try_acquire().unwrap();
            q.publish(h, &packet(seq));
        }
        for seq in 0..5 {
            assert_eq!(q.pop().unwrap().seq_no, seq);
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_full_ring_refuses_reservation() {
        let q = PacketQueue::new(4).unwrap();
        for seq in 0..4 {
            let h = q.try_acquire().unwrap();
            q.publish(h, &packet(seq));
        }
        assert!(q.try_acquire().is_none());

        // draining one slot frees one reservation
        assert_eq!(q.pop().unwrap().seq_no, 0);
        let h = q.try_acquire().unwrap();
        q.publish(h, &packet(4));
        assert!(q.try_acquire().is_none());
    }

    #[test]
    fn test_abandon_keeps_order() {
        let q = PacketQueue::new(4).unwrap();
        let h = q.try_acquire().unwrap();
        q.abandon(h);
        let h = q.try_acquire().unwrap();
        q.publish(h, &packet(7));
        assert_eq!(q.pop().unwrap().seq_no, 7);
    }

    #[test]
    fn test_cross_thread_handoff() {
        use std::sync::Arc;

        let q = Arc::new(PacketQueue::new(8).unwrap());
        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                let mut seq = 0u32;
                while seq < 1000 {
                    if let Some(h) = q.try_acquire() {
                        q.publish(h, &packet(seq));
                        seq += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut expected = 0u32;
        while expected < 1000 {
            if let Some(pkt) = q.pop() {
                assert_eq!(pkt.seq_no, expected);
                expected += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
    }
}
