// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! `junction-sim` entry point.

use std::io::Write;

use log::{LevelFilter, info};

use junction_engine::types::SimError;
use junction_sim::{Config, Simulator};

/// Configure the logger level and formatting string.
fn setup_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::builder()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
}

fn main() -> Result<(), SimError> {
    let config = Config::load()?;
    setup_logger(config.debug);
    info!("resolved configuration: {config:?}");

    let mut simulator = Simulator::new(config)?;
    let summary = simulator.run()?;
    for line in summary.to_string().lines() {
        info!("{line}");
    }
    Ok(())
}
