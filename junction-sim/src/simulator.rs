// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The simulation loop: build the fabric, inject generated traffic, run
//! cycles until every message has arrived, and aggregate the results.

use std::fmt;

use log::{debug, info};

use junction_engine::context::SimulationContext;
use junction_engine::network::Network;
use junction_engine::sim_error;
use junction_engine::types::SimError;

use crate::config::Config;
use crate::stats::Stats;

/// Whole-run aggregates, in the units the fabric measures: cycles for time,
/// channels for distance.
#[derive(Clone, Copy, Debug)]
pub struct Summary {
    pub cycles: u64,
    pub avg_latency: f64,
    pub avg_distance: f64,
    pub avg_size: f64,
    /// Messages delivered per cycle.
    pub throughput: f64,
    /// Distance covered per cycle of latency.
    pub speed: f64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "total simulation time: {} cycles", self.cycles)?;
        writeln!(f, "average latency: {:.3} cycles", self.avg_latency)?;
        writeln!(f, "average distance: {:.3} channels", self.avg_distance)?;
        writeln!(f, "average size: {:.3} units", self.avg_size)?;
        writeln!(f, "average throughput: {:.6} messages/cycle", self.throughput)?;
        write!(f, "average speed: {:.6} distance/latency", self.speed)
    }
}

pub struct Simulator {
    config: Config,
    network: Network,
    ctx: SimulationContext,
    stats: Stats,
}

impl Simulator {
    /// Build the network and load the generated traffic into it.
    pub fn new(config: Config) -> Result<Self, SimError> {
        config.validate()?;
        let mut network = Network::new(config.network_config())?;
        let traffic = junction_traffic::generate(&config.traffic_config());

        let mut ctx = SimulationContext::new(config.num_messages as usize);
        for message in traffic.messages() {
            ctx.register(message);
        }
        for (id, (outgoing, expected)) in traffic
            .outgoing
            .into_iter()
            .zip(traffic.expected)
            .enumerate()
        {
            network.processors[id].assign_traffic(outgoing, expected);
        }

        Ok(Simulator {
            config,
            network,
            ctx,
            stats: Stats::default(),
        })
    }

    /// Run cycles until every message is delivered, then write statistics
    /// and return the aggregates.
    pub fn run(&mut self) -> Result<Summary, SimError> {
        info!(
            "simulating {} messages on {} processors",
            self.config.num_messages, self.config.num_processors
        );
        let mut last_movement = (0, 0, 0);
        let mut idle_cycles = 0;
        while !self.ctx.all_delivered() {
            if self.ctx.clock >= self.config.max_cycles {
                sim_error!(format!(
                    "exceeded max_cycles ({}) before delivering all messages",
                    self.config.max_cycles
                ));
            }
            self.network.step(&mut self.ctx);
            self.ctx.clock += 1;
            self.stats.observe(&self.network);

            let movement = (
                self.network.total_flits_transmitted(),
                self.network.total_flits_received(),
                self.network.buffer_space_occupied(),
            );
            if movement == last_movement {
                idle_cycles += 1;
                if idle_cycles >= self.config.deadlock_cycles {
                    sim_error!(format!(
                        "no flit movement for {} cycles at cycle {}: the network is deadlocked",
                        self.config.deadlock_cycles, self.ctx.clock
                    ));
                }
            } else {
                idle_cycles = 0;
                last_movement = movement;
            }
            debug!(
                "cycle {}: {} flits in flight",
                self.ctx.clock,
                self.network.buffer_space_occupied()
            );
        }
        info!("all messages delivered after {} cycles", self.ctx.clock);
        for (id, record) in self.ctx.records().iter().enumerate() {
            debug!(
                "message {id}: {} -> {}, size {}, tx {:?}, rx {:?}, distance {:.2}",
                record.source,
                record.dest,
                record.size,
                record.tx_time,
                record.rx_time,
                record.avg_packet_distance
            );
        }

        if let Some(dir) = &self.config.stats_dir {
            self.stats.write(dir)?;
        }
        Ok(self.summary())
    }

    fn summary(&self) -> Summary {
        let records = self.ctx.records();
        let num_messages = records.len() as f64;
        let total_latency: u64 = records
            .iter()
            .filter_map(|record| record.latency())
            .sum();
        let total_distance: f64 = records.iter().map(|record| record.avg_packet_distance).sum();
        let total_size: u64 = records.iter().map(|record| u64::from(record.size)).sum();
        let avg_latency = total_latency as f64 / num_messages;
        let avg_distance = total_distance / num_messages;
        Summary {
            cycles: self.ctx.clock,
            avg_latency,
            avg_distance,
            avg_size: total_size as f64 / num_messages,
            throughput: num_messages / self.ctx.clock as f64,
            speed: avg_distance / avg_latency,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}
