// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Processor endpoints: message injection and ejection.
//!
//! A processor owns an injection buffer feeding its router and a single
//! receive buffer fed by it. Traffic is queued up front by the generator;
//! the tx phase drains one message at a time into the injection buffer and
//! offers its flits to the router, and the rx phase consumes delivered
//! flits immediately, so ejection never back-pressures the fabric.

use std::collections::{BTreeMap, VecDeque};

use log::debug;

use crate::context::SimulationContext;
use crate::message::{FlitKind, Message};
use crate::network::Network;
use crate::types::{BufferId, ChannelId, NodeId};

#[derive(Debug)]
pub struct Processor {
    pub id: NodeId,
    /// Outgoing flits waiting to enter the fabric.
    pub injection_buffer: BufferId,
    /// Landing slot for flits ejected by the co-located router.
    pub router_buffer: BufferId,
    /// Channel from this processor into its router.
    pub injection_channel: ChannelId,
    /// Channel from the router back to this processor.
    pub ejection_channel: ChannelId,
    /// Messages still to transmit, in order.
    pub tx_messages: VecDeque<Message>,
    /// Flits still expected per inbound message id.
    pub rx_expected: BTreeMap<u32, u64>,
    pub num_flits_transmitted: u64,
    pub num_flits_received: u64,
    /// Whether a flit was offered to the router this cycle.
    pub transmitted_this_cycle: bool,
    /// Whether a flit arrived from the router this cycle.
    pub received_this_cycle: bool,
}

impl Processor {
    pub fn new(
        id: NodeId,
        injection_buffer: BufferId,
        router_buffer: BufferId,
        injection_channel: ChannelId,
        ejection_channel: ChannelId,
    ) -> Self {
        Processor {
            id,
            injection_buffer,
            router_buffer,
            injection_channel,
            ejection_channel,
            tx_messages: VecDeque::new(),
            rx_expected: BTreeMap::new(),
            num_flits_transmitted: 0,
            num_flits_received: 0,
            transmitted_this_cycle: false,
            received_this_cycle: false,
        }
    }

    /// Queue outbound messages and register the inbound flit counts this
    /// processor must see before the simulation can end.
    pub fn assign_traffic(
        &mut self,
        outgoing: impl IntoIterator<Item = Message>,
        expected: impl IntoIterator<Item = (u32, u64)>,
    ) {
        self.tx_messages.extend(outgoing);
        for (message_id, flits) in expected {
            self.rx_expected.insert(message_id, flits);
        }
    }

    /// Whether all assigned traffic has been sent and received.
    pub fn is_drained(&self) -> bool {
        self.tx_messages.is_empty() && self.rx_expected.values().all(|&flits| flits == 0)
    }
}

/// Phase 2: inject the next message once the injection buffer has drained,
/// and offer its head-of-line flit to the router.
pub(crate) fn tx_phase(net: &mut Network, ctx: &mut SimulationContext, processor: NodeId) {
    let injection_buffer = net.processors[processor].injection_buffer;
    if net.buffers[injection_buffer].is_empty() {
        if let Some(message) = net.processors[processor].tx_messages.pop_front() {
            debug!("processor {processor}: injecting {message}");
            ctx.record_mut(message.message_id).tx_time = Some(ctx.clock);
            let mut injected = 0;
            for packet in message.packets {
                for flit in packet.flits {
                    if net.buffers[injection_buffer].insert_flit(flit).is_err() {
                        panic!(
                            "injection buffer of processor {processor} cannot hold message {}",
                            message.message_id
                        );
                    }
                    injected += 1;
                }
            }
            net.processors[processor].num_flits_transmitted += injected;
        }
    }

    let channel = net.processors[processor].injection_channel;
    if !net.buffers[injection_buffer].is_empty()
        && net.channels[channel].is_open_for_transmission()
    {
        let flit = *net.buffers[injection_buffer].peek_flit();
        net.channels[channel].propose_transmission(injection_buffer, &flit);
        net.processors[processor].transmitted_this_cycle = true;
    }
}

/// Phase 5: accept whatever the router ejected this cycle. Delivery always
/// succeeds; the flit is consumed on the spot.
pub(crate) fn rx_phase(net: &mut Network, ctx: &mut SimulationContext, processor: NodeId) {
    let channel = net.processors[processor].ejection_channel;
    if net.channels[channel].is_open_for_transmission() {
        return;
    }
    let router_buffer = net.processors[processor].router_buffer;
    let delivered = net.execute_pending(channel, router_buffer);
    if delivered.kind.is_tail() {
        net.channels[channel].reset_transmission_state();
    }

    let flit = net.buffers[router_buffer].remove_flit();
    net.processors[processor].num_flits_received += 1;
    net.processors[processor].received_this_cycle = true;
    if let FlitKind::Head { distance, .. } = flit.kind {
        // Average the per-packet path lengths into a per-message figure.
        let record = ctx.record_mut(flit.key.message_id);
        record.avg_packet_distance += f64::from(distance) / f64::from(flit.num_packets);
    }

    let message_id = flit.key.message_id;
    let remaining = match net.processors[processor].rx_expected.get_mut(&message_id) {
        Some(remaining) => remaining,
        None => panic!("processor {processor} received unexpected {flit}"),
    };
    if *remaining == 0 {
        panic!("processor {processor} received {flit} beyond the expected count");
    }
    *remaining -= 1;
    if *remaining == 0 {
        debug!("processor {processor}: message {message_id} fully received");
        ctx.record_mut(message_id).rx_time = Some(ctx.clock);
    }
}
