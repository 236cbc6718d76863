// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The network arena and the cycle engine.
//!
//! All nodes, channels and buffers live in flat vectors owned by the
//! [Network] and refer to each other by index, so the cyclic adjacency of a
//! mesh needs no shared ownership. [Network::step] runs one cycle as five
//! phases with a full barrier between them: each channel's handshake state
//! is written by its sender in a tx phase and consumed by its receiver in
//! the following rx phase, which is the whole concurrency story.

use itertools::iproduct;
use log::info;

use crate::buffer::Buffer;
use crate::channel::Channel;
use crate::context::SimulationContext;
use crate::flow_control::{FlowControlAlgorithm, FlowControlGranularity};
use crate::message::Flit;
use crate::processor::{self, Processor};
use crate::router::{self, IoChannel, Router, RouterSummary};
use crate::routing::{MeshTopology, RoutingAlgorithm};
use crate::sim_error;
use crate::types::{BufferId, ChannelId, Endpoint, NodeId, SimError};

/// Everything the fabric needs to build itself, resolved once at setup.
#[derive(Copy, Clone, Debug)]
pub struct NetworkConfig {
    /// Mesh vertices; must be a perfect square.
    pub num_processors: usize,
    pub num_virtual_channels: usize,
    /// Capacity of each virtual-channel buffer, in flits.
    pub router_buffer_capacity: usize,
    /// Capacity of each processor injection buffer, in flits; must hold the
    /// largest message whole.
    pub injection_buffer_capacity: usize,
    pub routing_algorithm: RoutingAlgorithm,
    pub flow_control_algorithm: FlowControlAlgorithm,
    pub flow_control_granularity: FlowControlGranularity,
    /// Seed for the per-router arbitration shuffles.
    pub seed: u64,
}

pub struct Network {
    pub config: NetworkConfig,
    pub topology: MeshTopology,
    pub processors: Vec<Processor>,
    pub routers: Vec<Router>,
    pub channels: Vec<Channel>,
    pub buffers: Vec<Buffer>,
}

impl Network {
    /// Build a square mesh with one processor-router pair per vertex and a
    /// channel pair along every edge.
    pub fn new(config: NetworkConfig) -> Result<Self, SimError> {
        let side = (config.num_processors as f64).sqrt() as usize;
        if side * side != config.num_processors || side == 0 {
            sim_error!(format!(
                "num_processors must be a positive square, got {}",
                config.num_processors
            ));
        }
        if config.num_virtual_channels == 0 {
            sim_error!("num_virtual_channels must be non-zero");
        }
        if config.router_buffer_capacity == 0 || config.injection_buffer_capacity == 0 {
            sim_error!("buffer capacities must be non-zero");
        }

        let mut network = Network {
            config,
            topology: MeshTopology::new(side, side),
            processors: Vec::with_capacity(config.num_processors),
            routers: Vec::with_capacity(config.num_processors),
            channels: Vec::new(),
            buffers: Vec::new(),
        };
        for id in 0..config.num_processors {
            network.routers.push(Router::new(id, config.seed));
        }
        for id in 0..config.num_processors {
            network.wire_processor(id);
        }
        for (y, x) in iproduct!(0..side, 0..side) {
            let vertex = network.topology.vertex(x, y);
            if x + 1 < side {
                network.wire_router_pair(vertex, network.topology.vertex(x + 1, y));
            }
            if y + 1 < side {
                network.wire_router_pair(vertex, network.topology.vertex(x, y + 1));
            }
        }
        info!(
            "built {side}x{side} mesh: {} channels, {} buffers",
            network.channels.len(),
            network.buffers.len()
        );
        Ok(network)
    }

    fn add_channel(&mut self, source: Endpoint, dest: Endpoint) -> ChannelId {
        self.channels.push(Channel::new(source, dest));
        self.channels.len() - 1
    }

    fn add_buffer(&mut self, capacity: usize) -> BufferId {
        self.buffers.push(Buffer::new(capacity));
        self.buffers.len() - 1
    }

    fn virtual_channel_buffers(&mut self) -> Vec<BufferId> {
        (0..self.config.num_virtual_channels)
            .map(|_| self.add_buffer(self.config.router_buffer_capacity))
            .collect()
    }

    fn wire_processor(&mut self, id: NodeId) {
        let injection_channel = self.add_channel(Endpoint::Processor(id), Endpoint::Router(id));
        let ejection_channel = self.add_channel(Endpoint::Router(id), Endpoint::Processor(id));
        let injection_buffer = self.add_buffer(self.config.injection_buffer_capacity);
        let router_buffer = self.add_buffer(self.config.injection_buffer_capacity);
        let virtual_channels = self.virtual_channel_buffers();
        self.routers[id].connect_processor(
            IoChannel {
                input: injection_channel,
                output: ejection_channel,
            },
            virtual_channels,
        );
        self.processors.push(Processor::new(
            id,
            injection_buffer,
            router_buffer,
            injection_channel,
            ejection_channel,
        ));
    }

    fn wire_router_pair(&mut self, a: NodeId, b: NodeId) {
        let a_to_b = self.add_channel(Endpoint::Router(a), Endpoint::Router(b));
        let b_to_a = self.add_channel(Endpoint::Router(b), Endpoint::Router(a));
        let buffers_a = self.virtual_channel_buffers();
        self.routers[a].connect_router(
            b,
            IoChannel {
                input: b_to_a,
                output: a_to_b,
            },
            buffers_a,
        );
        let buffers_b = self.virtual_channel_buffers();
        self.routers[b].connect_router(
            a,
            IoChannel {
                input: a_to_b,
                output: b_to_a,
            },
            buffers_b,
        );
    }

    /// The buffers a successful transmission on `channel` may land in.
    pub fn dest_buffers(&self, channel: ChannelId) -> &[BufferId] {
        match self.channels[channel].dest {
            Endpoint::Router(id) => self.routers[id].buffers_of(channel),
            Endpoint::Processor(id) => std::slice::from_ref(&self.processors[id].router_buffer),
        }
    }

    /// Execute the pending proposal on `channel` into `rx_buffer`, erasing
    /// the sending router's cached route when a TAIL departs.
    pub(crate) fn execute_pending(&mut self, channel: ChannelId, rx_buffer: BufferId) -> Flit {
        let Some((tx_buffer, key)) = self.channels[channel].proposed() else {
            panic!("execute on channel {channel} with no pending proposal");
        };
        let (tx, rx) = pair_mut(&mut self.buffers, tx_buffer, rx_buffer);
        let delivered = self.channels[channel].execute_transmission(tx, rx);
        if delivered.kind.is_tail() {
            if let Endpoint::Router(id) = self.channels[channel].source {
                self.routers[id].erase_cached_route(key);
            }
        }
        delivered
    }

    /// Run one simulated cycle: five phases, each finishing across the whole
    /// network before the next starts.
    pub fn step(&mut self, ctx: &mut SimulationContext) {
        for id in 0..self.routers.len() {
            self.routers[id].summary = RouterSummary::default();
        }
        for processor in &mut self.processors {
            processor.transmitted_this_cycle = false;
            processor.received_this_cycle = false;
        }
        for id in 0..self.processors.len() {
            processor::tx_phase(self, ctx, id);
        }
        for id in 0..self.routers.len() {
            router::tx_phase(self, id);
        }
        for id in 0..self.routers.len() {
            router::rx_phase(self, id);
        }
        for id in 0..self.processors.len() {
            processor::rx_phase(self, ctx, id);
        }
        for id in 0..self.routers.len() {
            self.recompute_summary(id);
        }
    }

    /// Refresh a router's occupancy figures and fold the cycle's failed
    /// handshakes into its stall count.
    fn recompute_summary(&mut self, id: NodeId) {
        let mut occupied = 0;
        let mut total = 0;
        for buffer in self.routers[id].buffer_ids() {
            occupied += self.buffers[buffer].occupancy();
            total += self.buffers[buffer].capacity();
        }
        for channel in self.routers[id].input_channel_ids() {
            if self.channels[channel].is_failed_transmission() {
                self.routers[id].summary.stalls += 1;
            }
        }
        let summary = &mut self.routers[id].summary;
        summary.buffer_space_occupied = occupied;
        summary.buffer_space_total = total;
    }

    /// Stalls recorded across all routers this cycle.
    pub fn stalls(&self) -> u64 {
        self.routers.iter().map(|router| router.summary.stalls).sum()
    }

    pub fn buffer_space_occupied(&self) -> usize {
        self.routers
            .iter()
            .map(|router| router.summary.buffer_space_occupied)
            .sum()
    }

    pub fn buffer_space_total(&self) -> usize {
        self.routers
            .iter()
            .map(|router| router.summary.buffer_space_total)
            .sum()
    }

    pub fn total_flits_transmitted(&self) -> u64 {
        self.processors
            .iter()
            .map(|processor| processor.num_flits_transmitted)
            .sum()
    }

    pub fn total_flits_received(&self) -> u64 {
        self.processors
            .iter()
            .map(|processor| processor.num_flits_received)
            .sum()
    }

    /// Processors that offered a flit to their router this cycle.
    pub fn processors_transmitting(&self) -> u32 {
        self.processors
            .iter()
            .filter(|processor| processor.transmitted_this_cycle)
            .count() as u32
    }

    /// Processors that took delivery of a flit this cycle.
    pub fn processors_receiving(&self) -> u32 {
        self.processors
            .iter()
            .filter(|processor| processor.received_this_cycle)
            .count() as u32
    }
}

/// Distinct mutable references to two arena buffers.
fn pair_mut(buffers: &mut [Buffer], a: BufferId, b: BufferId) -> (&mut Buffer, &mut Buffer) {
    assert!(a != b, "transmission within a single buffer");
    if a < b {
        let (lo, hi) = buffers.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = buffers.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig {
            num_processors: 4,
            num_virtual_channels: 1,
            router_buffer_capacity: 4,
            injection_buffer_capacity: 8,
            routing_algorithm: RoutingAlgorithm::MeshXy,
            flow_control_algorithm: FlowControlAlgorithm::CutThrough,
            flow_control_granularity: FlowControlGranularity::Packet,
            seed: 1,
        }
    }

    #[test]
    fn mesh_wiring_counts() {
        let network = Network::new(config()).unwrap();
        assert_eq!(network.processors.len(), 4);
        assert_eq!(network.routers.len(), 4);
        // 2 processor channels per vertex plus 2 per mesh edge.
        assert_eq!(network.channels.len(), 4 * 2 + 4 * 2);
        // Per vertex: injection + landing + processor-input VCs; per edge
        // direction: one VC set.
        assert_eq!(network.buffers.len(), 4 * 3 + 8);
    }

    #[test]
    fn corner_router_has_two_neighbours() {
        let network = Network::new(config()).unwrap();
        let neighbours: Vec<_> = network.routers[0].neighbours().collect();
        assert_eq!(neighbours.len(), 2);
        assert!(neighbours.contains(&1));
        assert!(neighbours.contains(&2));
    }

    #[test]
    fn non_square_processor_count_is_rejected() {
        let mut bad = config();
        bad.num_processors = 6;
        assert!(Network::new(bad).is_err());
    }

    #[test]
    fn zero_virtual_channels_is_rejected() {
        let mut bad = config();
        bad.num_virtual_channels = 0;
        assert!(Network::new(bad).is_err());
    }
}
