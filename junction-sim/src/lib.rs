// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Driver for the Junction mesh interconnect simulator: configuration
//! layering, the simulation loop and statistics output.

pub mod config;
pub mod simulator;
pub mod stats;

pub use config::Config;
pub use simulator::{Simulator, Summary};
