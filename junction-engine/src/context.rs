// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Simulation-wide mutable state: the clock and the per-message records.
//!
//! The context is threaded explicitly through every phase call rather than
//! living in globals, so two simulations can run side by side and tests can
//! inspect timing without scraping output.

use crate::message::Message;
use crate::types::NodeId;

/// Timing and accounting for one message, filled in as the simulation runs.
#[derive(Clone, Debug, Default)]
pub struct MessageRecord {
    pub source: NodeId,
    pub dest: NodeId,
    /// Size in flow-control units.
    pub size: u32,
    /// Cycle the message entered its injection buffer.
    pub tx_time: Option<u64>,
    /// Cycle its last flit reached the destination processor.
    pub rx_time: Option<u64>,
    /// Mean path length of the message's packets, in channels.
    pub avg_packet_distance: f64,
}

impl MessageRecord {
    /// Delivery latency in cycles, once both endpoints are recorded.
    pub fn latency(&self) -> Option<u64> {
        match (self.tx_time, self.rx_time) {
            (Some(tx), Some(rx)) => Some(rx - tx),
            _ => None,
        }
    }
}

/// The clock plus one [MessageRecord] per message, indexed by message id.
#[derive(Debug, Default)]
pub struct SimulationContext {
    pub clock: u64,
    records: Vec<MessageRecord>,
}

impl SimulationContext {
    pub fn new(num_messages: usize) -> Self {
        SimulationContext {
            clock: 0,
            records: vec![MessageRecord::default(); num_messages],
        }
    }

    /// Seed the record for a freshly generated message.
    pub fn register(&mut self, message: &Message) {
        let record = self.record_mut(message.message_id);
        record.source = message.source;
        record.dest = message.dest;
        record.size = message.size;
    }

    pub fn record(&self, message_id: u32) -> &MessageRecord {
        &self.records[message_id as usize]
    }

    pub fn record_mut(&mut self, message_id: u32) -> &mut MessageRecord {
        &mut self.records[message_id as usize]
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// End condition: every message has a recorded arrival.
    pub fn all_delivered(&self) -> bool {
        self.records.iter().all(|record| record.rx_time.is_some())
    }
}
