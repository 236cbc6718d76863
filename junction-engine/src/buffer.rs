// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Fixed-capacity FIFO flit buffers.
//!
//! Every buffer in the network lives in the [Network](crate::network::Network)
//! arena and is addressed by [BufferId](crate::types::BufferId). A buffer may
//! be reserved for a packet, which routes that packet's later flits to the
//! same virtual channel and keeps competing packets out.

use std::collections::VecDeque;

use crate::message::Flit;
use crate::types::PacketKey;

#[derive(Debug)]
pub struct Buffer {
    flits: VecDeque<Flit>,
    capacity: usize,
    reserved_for: Option<PacketKey>,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Buffer {
            flits: VecDeque::with_capacity(capacity),
            capacity,
            reserved_for: None,
        }
    }

    /// Append a flit, handing it back if the buffer is full.
    pub fn insert_flit(&mut self, flit: Flit) -> Result<(), Flit> {
        if self.flits.len() == self.capacity {
            return Err(flit);
        }
        self.flits.push_back(flit);
        Ok(())
    }

    /// Remove and return the flit at the head of the queue.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn remove_flit(&mut self) -> Flit {
        match self.flits.pop_front() {
            Some(flit) => flit,
            None => panic!("remove_flit on an empty buffer"),
        }
    }

    /// The flit at the head of the queue, without removing it.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn peek_flit(&self) -> &Flit {
        match self.flits.front() {
            Some(flit) => flit,
            None => panic!("peek_flit on an empty buffer"),
        }
    }

    /// Reserve the buffer for a packet.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already reserved; arbitration must only offer
    /// unreserved buffers to a fresh packet.
    pub fn reserve(&mut self, key: PacketKey) {
        if let Some(holder) = self.reserved_for {
            panic!("buffer already reserved for {holder} while reserving for {key}");
        }
        self.reserved_for = Some(key);
    }

    /// Release the reservation.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not reserved.
    pub fn unreserve(&mut self) {
        if self.reserved_for.take().is_none() {
            panic!("unreserve on a buffer that is not reserved");
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved_for.is_some()
    }

    pub fn is_reserved_for(&self, key: PacketKey) -> bool {
        self.reserved_for == Some(key)
    }

    pub fn is_empty(&self) -> bool {
        self.flits.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.flits.len() == self.capacity
    }

    pub fn occupancy(&self) -> usize {
        self.flits.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the TAIL flit of `key`'s packet is resident, meaning the whole
    /// packet is buffered here.
    pub fn holds_tail_of(&self, key: PacketKey) -> bool {
        self.flits
            .iter()
            .any(|flit| flit.key == key && flit.kind.is_tail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn flits() -> Vec<Flit> {
        Message::new(0, 0, 1, 4, 4, 1).packets.remove(0).flits
    }

    #[test]
    fn fifo_order_and_capacity() {
        let mut buffer = Buffer::new(2);
        let packet = flits();
        assert!(buffer.is_empty());
        buffer.insert_flit(packet[0]).unwrap();
        buffer.insert_flit(packet[1]).unwrap();
        assert!(buffer.is_full());
        assert_eq!(buffer.occupancy(), 2);
        // A third insert bounces and hands the flit back.
        let bounced = buffer.insert_flit(packet[2]).unwrap_err();
        assert_eq!(bounced, packet[2]);
        assert_eq!(buffer.remove_flit(), packet[0]);
        assert_eq!(buffer.peek_flit(), &packet[1]);
        assert_eq!(buffer.remove_flit(), packet[1]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn reservation_lifecycle() {
        let mut buffer = Buffer::new(4);
        let key = PacketKey {
            message_id: 3,
            packet_id: 0,
        };
        assert!(!buffer.is_reserved());
        buffer.reserve(key);
        assert!(buffer.is_reserved_for(key));
        assert!(!buffer.is_reserved_for(PacketKey {
            message_id: 3,
            packet_id: 1,
        }));
        buffer.unreserve();
        assert!(!buffer.is_reserved());
    }

    #[test]
    #[should_panic(expected = "already reserved")]
    fn double_reserve_is_fatal() {
        let mut buffer = Buffer::new(4);
        let key = PacketKey {
            message_id: 0,
            packet_id: 0,
        };
        buffer.reserve(key);
        buffer.reserve(key);
    }

    #[test]
    #[should_panic(expected = "not reserved")]
    fn unreserve_unreserved_is_fatal() {
        Buffer::new(4).unreserve();
    }

    #[test]
    #[should_panic(expected = "empty buffer")]
    fn remove_from_empty_is_fatal() {
        Buffer::new(4).remove_flit();
    }

    #[test]
    fn holds_tail_tracks_residency() {
        let mut buffer = Buffer::new(4);
        let packet = flits();
        let key = packet[0].key;
        buffer.insert_flit(packet[0]).unwrap();
        buffer.insert_flit(packet[1]).unwrap();
        assert!(!buffer.holds_tail_of(key));
        buffer.insert_flit(packet[2]).unwrap();
        assert!(buffer.holds_tail_of(key));
        buffer.remove_flit();
        buffer.remove_flit();
        assert!(buffer.holds_tail_of(key));
        buffer.remove_flit();
        assert!(!buffer.holds_tail_of(key));
    }
}
