// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Point-to-point channels and the two-phase transmission handshake.
//!
//! A transmission is proposed by the node holding the flit and executed (or
//! failed) by the receiving node later in the same cycle, so a flit crosses
//! at most one channel per cycle and a refusal loses nothing: the flit stays
//! queued in the transmit buffer and the proposal is retried.
//!
//! Independently of the per-cycle handshake a channel may be locked by a
//! packet. Under packet-granularity flow control the HEAD locks the channel
//! and the TAIL releases it, giving the packet exclusive use in between.

use std::fmt;

use log::trace;

use crate::buffer::Buffer;
use crate::message::{Flit, FlitKind};
use crate::types::{BufferId, Endpoint, PacketKey};

/// Per-cycle handshake state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TransmissionState {
    Unassigned,
    Assigned { tx_buffer: BufferId, key: PacketKey },
}

/// Outcome of the most recent handshake, read and cleared once per cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TransmissionStatus {
    Clear,
    Success,
    Fail,
}

#[derive(Debug)]
pub struct Channel {
    pub source: Endpoint,
    pub dest: Endpoint,
    state: TransmissionState,
    status: TransmissionStatus,
    lock: Option<PacketKey>,
}

impl Channel {
    pub fn new(source: Endpoint, dest: Endpoint) -> Self {
        Channel {
            source,
            dest,
            state: TransmissionState::Unassigned,
            status: TransmissionStatus::Clear,
            lock: None,
        }
    }

    pub fn is_open_for_transmission(&self) -> bool {
        self.state == TransmissionState::Unassigned
    }

    pub fn is_closed_for_transmission(&self) -> bool {
        !self.is_open_for_transmission()
    }

    /// The transmit buffer and packet of the pending proposal, if any.
    pub fn proposed(&self) -> Option<(BufferId, PacketKey)> {
        match self.state {
            TransmissionState::Unassigned => None,
            TransmissionState::Assigned { tx_buffer, key } => Some((tx_buffer, key)),
        }
    }

    /// Offer the flit at the head of `tx_buffer` for transmission this cycle.
    ///
    /// # Panics
    ///
    /// Panics if a proposal is already pending, or if the channel is locked
    /// by a different packet.
    pub fn propose_transmission(&mut self, tx_buffer: BufferId, flit: &Flit) {
        if let TransmissionState::Assigned { key, .. } = self.state {
            panic!("{self} already carries a proposal for {key}");
        }
        if let Some(holder) = self.lock {
            if holder != flit.key {
                panic!("{self} is locked by {holder}, cannot propose {}", flit.key);
            }
        }
        trace!("{self}: propose {flit}");
        self.state = TransmissionState::Assigned {
            tx_buffer,
            key: flit.key,
        };
    }

    /// Complete the pending proposal: move the flit from `tx` to `rx`,
    /// stepping the HEAD distance and releasing the transmit-side
    /// reservation when the TAIL departs. Returns the flit as delivered.
    ///
    /// # Panics
    ///
    /// Panics if no proposal is pending, if `tx` no longer fronts the
    /// proposed packet, or if `rx` is full; the receiver checks capacity
    /// before executing.
    pub fn execute_transmission(&mut self, tx: &mut Buffer, rx: &mut Buffer) -> Flit {
        let TransmissionState::Assigned { key, .. } = self.state else {
            panic!("{self}: execute without a pending proposal");
        };
        let mut flit = tx.remove_flit();
        if flit.key != key {
            panic!("{self}: proposal for {key} but {flit} fronts the buffer");
        }
        if let FlitKind::Head { distance, .. } = &mut flit.kind {
            *distance += 1;
        }
        if flit.kind.is_tail() && tx.is_reserved_for(key) {
            tx.unreserve();
        }
        if let Err(flit) = rx.insert_flit(flit) {
            panic!("{self}: receive buffer full while executing {flit}");
        }
        trace!("{self}: execute {flit}");
        self.state = TransmissionState::Unassigned;
        self.status = TransmissionStatus::Success;
        flit
    }

    /// Refuse the pending proposal. The flit stays in its transmit buffer
    /// and the proposal is left standing for retry next cycle.
    pub fn fail_transmission(&mut self) {
        assert!(
            self.is_closed_for_transmission(),
            "{self}: fail without a pending proposal"
        );
        trace!("{self}: transmission failed");
        self.status = TransmissionStatus::Fail;
    }

    /// Whether the last handshake failed. Reading clears the flag, so a
    /// failure is observed exactly once.
    pub fn is_failed_transmission(&mut self) -> bool {
        let failed = self.status == TransmissionStatus::Fail;
        self.status = TransmissionStatus::Clear;
        failed
    }

    /// Drop any pending proposal, lock and status. Used by the receiving
    /// processor once a packet has fully arrived.
    pub fn reset_transmission_state(&mut self) {
        self.state = TransmissionState::Unassigned;
        self.status = TransmissionStatus::Clear;
        self.lock = None;
    }

    /// Grant the channel to a packet until [unlock](Channel::unlock).
    ///
    /// # Panics
    ///
    /// Panics if already locked.
    pub fn lock(&mut self, key: PacketKey) {
        if let Some(holder) = self.lock {
            panic!("{self} is locked by {holder}, cannot lock for {key}");
        }
        self.lock = Some(key);
    }

    /// # Panics
    ///
    /// Panics if not locked.
    pub fn unlock(&mut self) {
        if self.lock.take().is_none() {
            panic!("unlock on {self} which is not locked");
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn is_locked_for(&self, key: PacketKey) -> bool {
        self.lock == Some(key)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "channel {} -> {}", self.source, self.dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn channel() -> Channel {
        Channel::new(Endpoint::Router(0), Endpoint::Router(1))
    }

    fn packet_flits() -> Vec<Flit> {
        Message::new(0, 0, 1, 4, 4, 1).packets.remove(0).flits
    }

    #[test]
    fn propose_then_execute_moves_the_flit() {
        let mut channel = channel();
        let mut tx = Buffer::new(4);
        let mut rx = Buffer::new(4);
        let flits = packet_flits();
        for flit in &flits {
            tx.insert_flit(*flit).unwrap();
        }

        assert!(channel.is_open_for_transmission());
        channel.propose_transmission(0, &flits[0]);
        assert!(channel.is_closed_for_transmission());
        assert_eq!(channel.proposed(), Some((0, flits[0].key)));

        let delivered = channel.execute_transmission(&mut tx, &mut rx);
        assert!(channel.is_open_for_transmission());
        assert_eq!(tx.occupancy(), 2);
        assert_eq!(rx.occupancy(), 1);
        // The HEAD picked up one channel of distance on the way over.
        match delivered.kind {
            FlitKind::Head { distance, .. } => assert_eq!(distance, 1),
            _ => panic!("expected a HEAD"),
        }
        assert!(!channel.is_failed_transmission());
    }

    #[test]
    fn tail_departure_releases_the_transmit_reservation() {
        let mut channel = channel();
        let mut tx = Buffer::new(4);
        let mut rx = Buffer::new(4);
        let flits = packet_flits();
        let key = flits[0].key;
        tx.reserve(key);
        for flit in &flits {
            tx.insert_flit(*flit).unwrap();
        }
        for flit in &flits {
            channel.propose_transmission(0, flit);
            channel.execute_transmission(&mut tx, &mut rx);
        }
        assert!(!tx.is_reserved());
        assert_eq!(rx.occupancy(), 3);
    }

    #[test]
    fn failure_is_observed_exactly_once() {
        let mut channel = channel();
        let flits = packet_flits();
        channel.propose_transmission(0, &flits[0]);
        channel.fail_transmission();
        // The proposal is left standing for retry.
        assert!(channel.is_closed_for_transmission());
        assert!(channel.is_failed_transmission());
        assert!(!channel.is_failed_transmission());
    }

    #[test]
    #[should_panic(expected = "already carries a proposal")]
    fn double_propose_is_fatal() {
        let mut channel = channel();
        let flits = packet_flits();
        channel.propose_transmission(0, &flits[0]);
        channel.propose_transmission(1, &flits[1]);
    }

    #[test]
    #[should_panic(expected = "is locked by")]
    fn propose_under_foreign_lock_is_fatal() {
        let mut channel = channel();
        let flits = packet_flits();
        channel.lock(PacketKey {
            message_id: 9,
            packet_id: 0,
        });
        channel.propose_transmission(0, &flits[0]);
    }

    #[test]
    fn lock_holder_may_propose() {
        let mut channel = channel();
        let flits = packet_flits();
        channel.lock(flits[0].key);
        assert!(channel.is_locked_for(flits[0].key));
        channel.propose_transmission(0, &flits[0]);
        channel.unlock();
        assert!(!channel.is_locked());
    }
}
