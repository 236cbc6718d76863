// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Synthetic traffic for the Junction simulator.
//!
//! Generation is two-staged: first a size is drawn for every message, then
//! sources and destinations are assigned, either uniformly (every processor
//! sends and receives its share) or at random. A message never targets its
//! own source. Generation is fully deterministic for a given seed.

use clap::ValueEnum;
use log::info;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use junction_engine::message::Message;
use junction_engine::types::NodeId;

/// How message sizes are drawn.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeDistribution {
    /// Every message is the midpoint of the configured size range.
    #[default]
    Uniform,
    /// Sizes are drawn uniformly at random from the configured range.
    Random,
}

/// How endpoints are assigned.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeDistribution {
    /// Every processor sends and receives an equal share of the messages,
    /// with the pairing shuffled.
    #[default]
    Uniform,
    /// Sources and destinations are drawn independently at random.
    Random,
}

#[derive(Clone, Copy, Debug)]
pub struct TrafficConfig {
    pub seed: u64,
    pub num_messages: u32,
    pub num_processors: usize,
    /// Inclusive lower bound on message size, in flow-control units.
    pub lower_message_size: u32,
    /// Exclusive upper bound on message size.
    pub upper_message_size: u32,
    /// Flow-control units per packet; sizes are rounded down to a multiple.
    pub packet_width: u32,
    pub data_flits_per_packet: u32,
    pub size_distribution: SizeDistribution,
    pub node_distribution: NodeDistribution,
}

/// Generated traffic, keyed by processor.
#[derive(Debug)]
pub struct Traffic {
    /// Outbound messages per source processor, in injection order.
    pub outgoing: Vec<Vec<Message>>,
    /// `(message_id, expected flits)` per destination processor.
    pub expected: Vec<Vec<(u32, u64)>>,
}

impl Traffic {
    /// All generated messages, across every source.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.outgoing.iter().flatten()
    }
}

/// Generate `config.num_messages` messages.
pub fn generate(config: &TrafficConfig) -> Traffic {
    assert!(
        config.num_processors > 1,
        "traffic needs at least two processors"
    );
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
    let sizes = message_sizes(config, &mut rng);
    let mut traffic = Traffic {
        outgoing: vec![Vec::new(); config.num_processors],
        expected: vec![Vec::new(); config.num_processors],
    };
    match config.node_distribution {
        NodeDistribution::Uniform => {
            // Deal destinations round-robin, then shuffle the pairing so the
            // load is even without being trivially diagonal.
            let mut dests: Vec<NodeId> = (0..config.num_messages as usize)
                .map(|i| i % config.num_processors)
                .collect();
            dests.shuffle(&mut rng);
            for (i, size) in sizes.into_iter().enumerate() {
                let source = i % config.num_processors;
                let mut dest = dests[i];
                while dest == source {
                    dest = rng.gen_range(0..config.num_processors);
                }
                add_message(config, &mut traffic, i as u32, source, dest, size);
            }
        }
        NodeDistribution::Random => {
            for (i, size) in sizes.into_iter().enumerate() {
                let source = rng.gen_range(0..config.num_processors);
                let mut dest = source;
                while dest == source {
                    dest = rng.gen_range(0..config.num_processors);
                }
                add_message(config, &mut traffic, i as u32, source, dest, size);
            }
        }
    }
    info!(
        "generated {} messages across {} processors (seed {})",
        config.num_messages, config.num_processors, config.seed
    );
    traffic
}

fn add_message(
    config: &TrafficConfig,
    traffic: &mut Traffic,
    message_id: u32,
    source: NodeId,
    dest: NodeId,
    size: u32,
) {
    let message = Message::new(
        message_id,
        source,
        dest,
        size,
        config.packet_width,
        config.data_flits_per_packet,
    );
    traffic.expected[dest].push((message_id, u64::from(message.num_flits())));
    traffic.outgoing[source].push(message);
}

fn message_sizes(config: &TrafficConfig, rng: &mut Xoshiro256PlusPlus) -> Vec<u32> {
    assert!(
        config.lower_message_size >= config.packet_width
            && config.upper_message_size >= config.lower_message_size,
        "message size range [{}, {}) must sit above the packet width {}",
        config.lower_message_size,
        config.upper_message_size,
        config.packet_width
    );
    (0..config.num_messages)
        .map(|_| {
            let raw = match config.size_distribution {
                SizeDistribution::Uniform => {
                    (config.lower_message_size + config.upper_message_size) / 2
                }
                SizeDistribution::Random => {
                    if config.upper_message_size == config.lower_message_size {
                        config.lower_message_size
                    } else {
                        rng.gen_range(config.lower_message_size..config.upper_message_size)
                    }
                }
            };
            // Packets are fixed-width, so sizes snap down to a whole number
            // of packets.
            (raw / config.packet_width) * config.packet_width
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn config() -> TrafficConfig {
        TrafficConfig {
            seed: 15418,
            num_messages: 32,
            num_processors: 16,
            lower_message_size: 4,
            upper_message_size: 16,
            packet_width: 4,
            data_flits_per_packet: 2,
            size_distribution: SizeDistribution::Uniform,
            node_distribution: NodeDistribution::Uniform,
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate(&config());
        let b = generate(&config());
        for (lhs, rhs) in a.messages().zip_eq(b.messages()) {
            assert_eq!(lhs.message_id, rhs.message_id);
            assert_eq!(lhs.source, rhs.source);
            assert_eq!(lhs.dest, rhs.dest);
            assert_eq!(lhs.size, rhs.size);
        }
    }

    #[test]
    fn no_message_targets_its_source() {
        for node_distribution in [NodeDistribution::Uniform, NodeDistribution::Random] {
            let traffic = generate(&TrafficConfig {
                node_distribution,
                ..config()
            });
            assert!(traffic.messages().all(|message| message.source != message.dest));
        }
    }

    #[test]
    fn uniform_nodes_spread_the_load_evenly() {
        let traffic = generate(&config());
        for (source, messages) in traffic.outgoing.iter().enumerate() {
            assert_eq!(messages.len(), 2, "processor {source} sends its share");
        }
        assert_eq!(traffic.messages().count(), 32);
    }

    #[test]
    fn uniform_sizes_are_the_range_midpoint() {
        let traffic = generate(&config());
        assert!(traffic.messages().all(|message| message.size == 8));
    }

    #[test]
    fn random_sizes_stay_in_range_and_packet_aligned() {
        let traffic = generate(&TrafficConfig {
            size_distribution: SizeDistribution::Random,
            ..config()
        });
        for message in traffic.messages() {
            assert!(message.size >= 4 && message.size < 16);
            assert_eq!(message.size % 4, 0);
        }
    }

    #[test]
    fn expected_flit_counts_cover_every_message() {
        let traffic = generate(&config());
        let total_expected: u64 = traffic
            .expected
            .iter()
            .flatten()
            .map(|(_, flits)| *flits)
            .sum();
        let total_generated: u64 = traffic
            .messages()
            .map(|message| u64::from(message.num_flits()))
            .sum();
        assert_eq!(total_expected, total_generated);
    }
}
