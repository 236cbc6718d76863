// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Layered simulation configuration.
//!
//! Values are resolved from four sources, later ones winning: built-in
//! defaults, a TOML configuration file (`junction.toml` unless `--conf-file`
//! points elsewhere), `JUNCTION_`-prefixed environment variables, and
//! finally command-line flags.

use std::path::PathBuf;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use log::warn;
use serde::{Deserialize, Serialize};

use junction_engine::flow_control::{FlowControlAlgorithm, FlowControlGranularity};
use junction_engine::network::NetworkConfig;
use junction_engine::routing::RoutingAlgorithm;
use junction_engine::sim_error;
use junction_engine::types::SimError;
use junction_traffic::{NodeDistribution, SizeDistribution, TrafficConfig};

/// Supported fabric topologies.
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    #[default]
    Mesh,
}

/// Fully resolved simulation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub network_type: NetworkType,
    pub num_processors: usize,
    pub num_routers: usize,
    pub router_buffer_capacity: usize,
    pub num_virtual_channels: usize,
    /// Flow-control units per packet.
    pub packet_width: u32,
    pub num_data_flits_per_packet: u32,
    pub routing_algorithm: RoutingAlgorithm,
    pub flow_control_algorithm: FlowControlAlgorithm,
    pub flow_control_granularity: FlowControlGranularity,
    pub num_messages: u32,
    /// Inclusive lower bound on generated message sizes.
    pub lower_message_size: u32,
    /// Exclusive upper bound on generated message sizes.
    pub upper_message_size: u32,
    pub message_size_distribution: SizeDistribution,
    pub message_node_distribution: NodeDistribution,
    pub seed: u64,
    /// Hard ceiling on simulated cycles.
    pub max_cycles: u64,
    /// Cycles without any flit movement before the run is declared
    /// deadlocked.
    pub deadlock_cycles: u64,
    /// Directory for per-cycle statistics files; nothing is written when
    /// unset.
    pub stats_dir: Option<PathBuf>,
    /// Enable debug log messages.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network_type: NetworkType::Mesh,
            num_processors: 16,
            num_routers: 16,
            router_buffer_capacity: 4,
            num_virtual_channels: 2,
            packet_width: 4,
            num_data_flits_per_packet: 2,
            routing_algorithm: RoutingAlgorithm::default(),
            flow_control_algorithm: FlowControlAlgorithm::default(),
            flow_control_granularity: FlowControlGranularity::default(),
            num_messages: 64,
            lower_message_size: 4,
            upper_message_size: 16,
            message_size_distribution: SizeDistribution::default(),
            message_node_distribution: NodeDistribution::default(),
            seed: 15418,
            max_cycles: 1_000_000,
            deadlock_cycles: 10_000,
            stats_dir: None,
            debug: false,
        }
    }
}

/// Command-line arguments; unset flags defer to the other sources.
#[derive(Parser, Debug)]
#[command(about = "Cycle-accurate simulation of mesh interconnection networks")]
pub struct Cli {
    /// TOML configuration file to merge over the defaults
    #[arg(long, default_value = "junction.toml")]
    pub conf_file: PathBuf,

    #[arg(long, value_enum)]
    pub network_type: Option<NetworkType>,

    /// Mesh vertices; must be a perfect square
    #[arg(long)]
    pub num_processors: Option<usize>,

    /// Must match --num-processors: one router per vertex
    #[arg(long)]
    pub num_routers: Option<usize>,

    /// Capacity of each virtual-channel buffer, in flits
    #[arg(long)]
    pub router_buffer_capacity: Option<usize>,

    #[arg(long)]
    pub num_virtual_channels: Option<usize>,

    /// Flow-control units per packet
    #[arg(long)]
    pub packet_width: Option<u32>,

    #[arg(long)]
    pub num_data_flits_per_packet: Option<u32>,

    #[arg(long, value_enum)]
    pub routing_algorithm: Option<RoutingAlgorithm>,

    #[arg(long, value_enum)]
    pub flow_control_algorithm: Option<FlowControlAlgorithm>,

    #[arg(long, value_enum)]
    pub flow_control_granularity: Option<FlowControlGranularity>,

    #[arg(long)]
    pub num_messages: Option<u32>,

    #[arg(long)]
    pub lower_message_size: Option<u32>,

    #[arg(long)]
    pub upper_message_size: Option<u32>,

    #[arg(long, value_enum)]
    pub message_size_distribution: Option<SizeDistribution>,

    #[arg(long, value_enum)]
    pub message_node_distribution: Option<NodeDistribution>,

    /// Seed for traffic generation and arbitration shuffles
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub max_cycles: Option<u64>,

    #[arg(long)]
    pub deadlock_cycles: Option<u64>,

    /// Directory for per-cycle statistics files
    #[arg(long)]
    pub stats_dir: Option<PathBuf>,

    /// Enable debug log messages
    #[arg(short, long)]
    pub debug: bool,
}

macro_rules! override_with_cli {
    ($config:ident, $cli:ident, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $cli.$field {
                $config.$field = value;
            }
        )+
    };
}

impl Config {
    /// Resolve the configuration from all four sources.
    pub fn load() -> Result<Self, SimError> {
        Self::resolve(Cli::parse())
    }

    fn resolve(cli: Cli) -> Result<Self, SimError> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.conf_file))
            .merge(Env::prefixed("JUNCTION_"))
            .extract()
            .map_err(|err| SimError(format!("configuration: {err}")))?;

        override_with_cli!(
            config,
            cli,
            network_type,
            num_processors,
            num_routers,
            router_buffer_capacity,
            num_virtual_channels,
            packet_width,
            num_data_flits_per_packet,
            routing_algorithm,
            flow_control_algorithm,
            flow_control_granularity,
            num_messages,
            lower_message_size,
            upper_message_size,
            message_size_distribution,
            message_node_distribution,
            seed,
            max_cycles,
            deadlock_cycles,
        );
        // stats_dir is optional in the resolved config too, so a plain
        // Some-wins override does not fit the macro.
        if cli.stats_dir.is_some() {
            config.stats_dir = cli.stats_dir;
        }
        if cli.debug {
            config.debug = true;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.num_routers != self.num_processors {
            sim_error!(format!(
                "num_routers ({}) must equal num_processors ({}): one router per vertex",
                self.num_routers, self.num_processors
            ));
        }
        if self.packet_width == 0 {
            sim_error!("packet_width must be non-zero");
        }
        if self.lower_message_size < self.packet_width {
            sim_error!(format!(
                "lower_message_size ({}) must be at least the packet width ({})",
                self.lower_message_size, self.packet_width
            ));
        }
        if self.upper_message_size < self.lower_message_size {
            sim_error!(format!(
                "message size range [{}, {}) is empty",
                self.lower_message_size, self.upper_message_size
            ));
        }
        if self.num_messages == 0 {
            sim_error!("num_messages must be non-zero");
        }
        let flits_per_packet = (self.num_data_flits_per_packet + 2) as usize;
        if self.flow_control_algorithm == FlowControlAlgorithm::StoreForward
            && self.router_buffer_capacity < flits_per_packet
        {
            warn!(
                "store-forward with router_buffer_capacity {} cannot hold a {flits_per_packet}-flit packet; traffic will wedge",
                self.router_buffer_capacity
            );
        }
        Ok(())
    }

    /// Injection buffers must hold the largest possible message whole.
    pub fn injection_buffer_capacity(&self) -> usize {
        let max_packets = self.upper_message_size / self.packet_width;
        (max_packets * (self.num_data_flits_per_packet + 2)) as usize
    }

    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            num_processors: self.num_processors,
            num_virtual_channels: self.num_virtual_channels,
            router_buffer_capacity: self.router_buffer_capacity,
            injection_buffer_capacity: self.injection_buffer_capacity(),
            routing_algorithm: self.routing_algorithm,
            flow_control_algorithm: self.flow_control_algorithm,
            flow_control_granularity: self.flow_control_granularity,
            seed: self.seed,
        }
    }

    pub fn traffic_config(&self) -> TrafficConfig {
        TrafficConfig {
            seed: self.seed,
            num_messages: self.num_messages,
            num_processors: self.num_processors,
            lower_message_size: self.lower_message_size,
            upper_message_size: self.upper_message_size,
            packet_width: self.packet_width,
            data_flits_per_packet: self.num_data_flits_per_packet,
            size_distribution: self.message_size_distribution,
            node_distribution: self.message_node_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("junction-sim").chain(args.iter().copied()))
    }

    #[test]
    #[serial]
    fn defaults_resolve_without_a_conf_file() {
        let config = Config::resolve(cli(&[])).unwrap();
        assert_eq!(config.num_processors, 16);
        assert_eq!(config.seed, 15418);
        assert_eq!(config.routing_algorithm, RoutingAlgorithm::MeshXy);
        assert!(config.stats_dir.is_none());
    }

    #[test]
    #[serial]
    fn cli_flags_override_defaults() {
        let config = Config::resolve(cli(&[
            "--num-processors",
            "4",
            "--num-routers",
            "4",
            "--routing-algorithm",
            "mesh-adaptive",
            "--seed",
            "7",
        ]))
        .unwrap();
        assert_eq!(config.num_processors, 4);
        assert_eq!(config.num_routers, 4);
        assert_eq!(config.routing_algorithm, RoutingAlgorithm::MeshAdaptive);
        assert_eq!(config.seed, 7);
        // Untouched fields keep their defaults.
        assert_eq!(config.packet_width, 4);
    }

    #[test]
    #[serial]
    fn cli_stats_dir_lands_in_the_config() {
        let config = Config::resolve(cli(&["--stats-dir", "out/stats"])).unwrap();
        assert_eq!(config.stats_dir, Some(PathBuf::from("out/stats")));
    }

    #[test]
    #[serial]
    fn toml_and_env_layers_slot_between_defaults_and_cli() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "junction.toml",
                r#"
                    seed = 21
                    num_messages = 10
                    routing_algorithm = "mesh-yx"
                "#,
            )?;
            jail.set_env("JUNCTION_NUM_MESSAGES", "12");
            let config = Config::resolve(cli(&["--routing-algorithm", "mesh-adaptive"])).unwrap();
            // The TOML file beats the built-in defaults.
            assert_eq!(config.seed, 21);
            // The environment beats the TOML file.
            assert_eq!(config.num_messages, 12);
            // CLI flags beat everything.
            assert_eq!(config.routing_algorithm, RoutingAlgorithm::MeshAdaptive);
            // Untouched fields still come from the defaults.
            assert_eq!(config.num_processors, 16);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn mismatched_router_count_is_rejected() {
        let result = Config::resolve(cli(&["--num-routers", "9"]));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn empty_size_range_is_rejected() {
        let result = Config::resolve(cli(&[
            "--lower-message-size",
            "8",
            "--upper-message-size",
            "4",
        ]));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn injection_buffers_hold_the_largest_message() {
        let config = Config::resolve(cli(&[])).unwrap();
        // upper 16 / width 4 packets, each 2 data flits plus HEAD and TAIL.
        assert_eq!(config.injection_buffer_capacity(), 16);
    }
}
