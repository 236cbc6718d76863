// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Per-cycle statistics and their on-disk form.
//!
//! One sample per cycle, one value per line in the output files, so the
//! plotting side stays a plain column read.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;

use junction_engine::network::Network;
use junction_engine::types::{SimError, SimResult};

#[derive(Debug, Default)]
pub struct Stats {
    /// Processors that offered a flit to the fabric, per cycle.
    pub processors_transmitting: Vec<u32>,
    /// Processors that took delivery of a flit, per cycle.
    pub processors_receiving: Vec<u32>,
    /// Stalls across all routers, per cycle.
    pub stalls: Vec<u64>,
    /// Occupied fraction of all router buffer space, per cycle.
    pub buffer_efficiency: Vec<f64>,
}

impl Stats {
    /// Sample the network at the end of a cycle.
    pub fn observe(&mut self, network: &Network) {
        self.processors_transmitting
            .push(network.processors_transmitting());
        self.processors_receiving
            .push(network.processors_receiving());
        self.stalls.push(network.stalls());
        let total = network.buffer_space_total();
        let efficiency = if total == 0 {
            0.0
        } else {
            network.buffer_space_occupied() as f64 / total as f64
        };
        self.buffer_efficiency.push(efficiency);
    }

    pub fn num_cycles(&self) -> usize {
        self.stalls.len()
    }

    /// Write the four per-cycle series under `dir`.
    pub fn write(&self, dir: &Path) -> SimResult {
        write_series(&dir.join("tx_stats.txt"), &self.processors_transmitting)?;
        write_series(&dir.join("rx_stats.txt"), &self.processors_receiving)?;
        write_series(&dir.join("stall_stats.txt"), &self.stalls)?;
        write_series(&dir.join("buffer_stats.txt"), &self.buffer_efficiency)?;
        info!("wrote statistics for {} cycles to {}", self.num_cycles(), dir.display());
        Ok(())
    }
}

fn write_series<T: std::fmt::Display>(path: &Path, values: &[T]) -> SimResult {
    let file = File::create(path)
        .map_err(|err| SimError(format!("cannot create {}: {err}", path.display())))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writeln!(writer, "{value}")
            .map_err(|err| SimError(format!("cannot write {}: {err}", path.display())))?;
    }
    Ok(())
}
