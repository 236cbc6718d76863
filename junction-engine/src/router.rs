// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Router state and the per-cycle tx/rx arbitration.
//!
//! The tx phase walks the router's virtual-channel buffers in a randomised
//! order, routes the flit at the head of each and proposes it on an output
//! channel toward the chosen hop. The rx phase later in the same cycle
//! admits pending proposals into this router's own buffers, or fails them
//! for retry. Failures are counted as stalls, the simulator's contention
//! metric; nothing is ever dropped.

use log::{debug, trace};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::flow_control::FlowControlGranularity;
use crate::message::Flit;
use crate::network::Network;
use crate::routing::PathCache;
use crate::types::{BufferId, ChannelId, NodeId, PacketKey};

/// A matched pair of channels between this router and one neighbour:
/// `input` carries traffic in, `output` carries traffic out.
#[derive(Copy, Clone, Debug)]
pub struct IoChannel {
    pub input: ChannelId,
    pub output: ChannelId,
}

/// Per-cycle observability counters, cleared at the start of each cycle and
/// recomputed after the rx phase.
#[derive(Copy, Clone, Debug, Default)]
pub struct RouterSummary {
    /// Flits that wanted to move this cycle and could not.
    pub stalls: u64,
    pub buffer_space_occupied: usize,
    pub buffer_space_total: usize,
}

#[derive(Debug)]
pub struct Router {
    pub id: NodeId,
    /// Virtual-channel buffers per input channel.
    input_buffers: Vec<(ChannelId, Vec<BufferId>)>,
    /// Channel pairs to each neighbouring router.
    neighbour_io: Vec<(NodeId, Vec<IoChannel>)>,
    /// Channel pairs to the co-located processor.
    processor_io: Vec<IoChannel>,
    pub path_cache: PathCache,
    pub summary: RouterSummary,
    rng: Xoshiro256PlusPlus,
}

impl Router {
    pub fn new(id: NodeId, seed: u64) -> Self {
        Router {
            id,
            input_buffers: Vec::new(),
            neighbour_io: Vec::new(),
            processor_io: Vec::new(),
            path_cache: PathCache::default(),
            summary: RouterSummary::default(),
            // Offset by id so routers draw distinct arbitration sequences.
            rng: Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(id as u64)),
        }
    }

    /// Wire the channel pair to the co-located processor. `buffers` are the
    /// virtual channels receiving from `io.input`.
    pub fn connect_processor(&mut self, io: IoChannel, buffers: Vec<BufferId>) {
        self.input_buffers.push((io.input, buffers));
        self.processor_io.push(io);
    }

    /// Wire a channel pair to a neighbouring router.
    pub fn connect_router(&mut self, neighbour: NodeId, io: IoChannel, buffers: Vec<BufferId>) {
        self.input_buffers.push((io.input, buffers));
        match self
            .neighbour_io
            .iter_mut()
            .find(|(id, _)| *id == neighbour)
        {
            Some((_, ios)) => ios.push(io),
            None => self.neighbour_io.push((neighbour, vec![io])),
        }
    }

    /// The virtual-channel buffers receiving from `channel`.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is not an input of this router.
    pub fn buffers_of(&self, channel: ChannelId) -> &[BufferId] {
        match self.input_buffers.iter().find(|(ch, _)| *ch == channel) {
            Some((_, buffers)) => buffers,
            None => panic!("channel {channel} is not an input of router {}", self.id),
        }
    }

    /// Output channel pairs toward `next_hop`; the router's own id selects
    /// the ejection channels to its processor.
    ///
    /// # Panics
    ///
    /// Panics if `next_hop` is not adjacent, which would mean a routing
    /// decision escaped the mesh.
    pub fn io_channels_toward(&self, next_hop: NodeId) -> &[IoChannel] {
        if next_hop == self.id {
            return &self.processor_io;
        }
        match self.neighbour_io.iter().find(|(id, _)| *id == next_hop) {
            Some((_, ios)) => ios,
            None => panic!("router {} has no channels toward {next_hop}", self.id),
        }
    }

    pub fn neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbour_io.iter().map(|(id, _)| *id)
    }

    pub fn input_channel_ids(&self) -> Vec<ChannelId> {
        self.input_buffers.iter().map(|(ch, _)| *ch).collect()
    }

    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.input_buffers
            .iter()
            .flat_map(|(_, buffers)| buffers.iter().copied())
            .collect()
    }

    pub fn erase_cached_route(&mut self, key: PacketKey) {
        self.path_cache.erase(key);
    }

    /// The input buffer sets with the virtual channels of each set shuffled,
    /// so arbitration order cannot systematically starve a buffer.
    fn shuffled_input_buffers(&mut self) -> Vec<(ChannelId, Vec<BufferId>)> {
        let mut sets = self.input_buffers.clone();
        for (_, buffers) in &mut sets {
            buffers.shuffle(&mut self.rng);
        }
        sets
    }
}

/// Phase 3: propose a transmission for the head-of-line flit of every
/// non-empty virtual-channel buffer that can find a viable output channel.
pub(crate) fn tx_phase(net: &mut Network, router: NodeId) {
    // Downstream occupancy snapshot for adaptive routing, taken before any
    // proposal this router makes can disturb it.
    let vacancy: Vec<(NodeId, bool)> = net.routers[router]
        .neighbour_io
        .iter()
        .map(|(neighbour, ios)| {
            let free = ios.iter().any(|io| {
                net.dest_buffers(io.output)
                    .iter()
                    .any(|&b| !net.buffers[b].is_reserved() && !net.buffers[b].is_full())
            });
            (*neighbour, free)
        })
        .collect();

    for (_, buffers) in net.routers[router].shuffled_input_buffers() {
        for buffer in buffers {
            transmit_from_buffer(net, router, buffer, &vacancy);
        }
    }
}

fn transmit_from_buffer(net: &mut Network, router: NodeId, buffer: BufferId, vacancy: &[(NodeId, bool)]) {
    if net.buffers[buffer].is_empty() {
        return;
    }
    let flit = *net.buffers[buffer].peek_flit();
    let topology = net.topology;
    let routing = net.config.routing_algorithm;
    let next_hop = routing.next_hop(
        &flit,
        router,
        &topology,
        &mut net.routers[router].path_cache,
        vacancy,
    );
    let candidates = net.routers[router].io_channels_toward(next_hop).to_vec();

    // A refused proposal stands until the receiver executes it; leave it be.
    for io in &candidates {
        if net.channels[io.output].proposed() == Some((buffer, flit.key)) {
            return;
        }
    }

    if !net
        .config
        .flow_control_algorithm
        .admits(&flit, &net.buffers[buffer])
    {
        trace!("router {router}: {flit} held back by flow control");
        net.routers[router].summary.stalls += 1;
        return;
    }

    for io in &candidates {
        if try_propose(net, buffer, &flit, io.output) {
            trace!("router {router}: {flit} proposed toward {next_hop}");
            return;
        }
    }
    debug!("router {router}: {flit} stalled, no viable channel toward {next_hop}");
    net.routers[router].summary.stalls += 1;
}

/// Attempt to claim `channel` for `flit` under the configured granularity.
fn try_propose(net: &mut Network, buffer: BufferId, flit: &Flit, channel: ChannelId) -> bool {
    match net.config.flow_control_granularity {
        FlowControlGranularity::Packet => {
            if net.channels[channel].is_locked_for(flit.key)
                && net.channels[channel].is_open_for_transmission()
            {
                net.channels[channel].propose_transmission(buffer, flit);
                if flit.kind.is_tail() {
                    net.channels[channel].unlock();
                }
                return true;
            }
            if !net.channels[channel].is_locked()
                && net.channels[channel].is_open_for_transmission()
            {
                if !flit.kind.is_head() {
                    panic!("{flit} claiming unlocked {}", net.channels[channel]);
                }
                net.channels[channel].propose_transmission(buffer, flit);
                net.channels[channel].lock(flit.key);
                return true;
            }
            false
        }
        FlowControlGranularity::Flit => {
            if net.channels[channel].is_closed_for_transmission() {
                return false;
            }
            let dest_buffers = net.dest_buffers(channel).to_vec();
            if let Some(&reserved) = dest_buffers
                .iter()
                .find(|&&b| net.buffers[b].is_reserved_for(flit.key))
            {
                // Ordering into the reserved buffer must hold, so a full
                // reservation is a stall, not a reason to try elsewhere.
                if net.buffers[reserved].is_full() {
                    return false;
                }
                net.channels[channel].propose_transmission(buffer, flit);
                return true;
            }
            if dest_buffers
                .iter()
                .any(|&b| !net.buffers[b].is_reserved() && !net.buffers[b].is_full())
            {
                net.channels[channel].propose_transmission(buffer, flit);
                return true;
            }
            false
        }
    }
}

/// Phase 4: admit pending proposals on this router's input channels into
/// its virtual-channel buffers, or fail them for retry next cycle.
pub(crate) fn rx_phase(net: &mut Network, router: NodeId) {
    for channel in net.routers[router].input_channel_ids() {
        if net.channels[channel].is_open_for_transmission() {
            continue;
        }
        let Some((tx_buffer, key)) = net.channels[channel].proposed() else {
            continue;
        };
        let flit = *net.buffers[tx_buffer].peek_flit();
        let candidates = net.routers[router].buffers_of(channel).to_vec();

        // Continuation: a buffer already reserved for this packet takes its
        // later flits, keeping the packet contiguous in one virtual channel.
        if let Some(&reserved) = candidates
            .iter()
            .find(|&&b| net.buffers[b].is_reserved_for(key))
        {
            if net.buffers[reserved].is_full() {
                net.channels[channel].fail_transmission();
                continue;
            }
            let delivered = net.execute_pending(channel, reserved);
            if delivered.kind.is_tail()
                && net.config.flow_control_granularity == FlowControlGranularity::Packet
            {
                net.channels[channel].reset_transmission_state();
            }
            continue;
        }

        // Fresh admission: only a HEAD may open a reservation.
        if flit.kind.is_head()
            && net
                .config
                .flow_control_algorithm
                .admits(&flit, &net.buffers[tx_buffer])
        {
            if let Some(&open) = candidates
                .iter()
                .find(|&&b| !net.buffers[b].is_reserved() && !net.buffers[b].is_full())
            {
                net.buffers[open].reserve(key);
                net.execute_pending(channel, open);
                continue;
            }
        }

        debug!("router {router}: refusing {flit} on channel {channel}");
        net.channels[channel].fail_transmission();
    }
}
