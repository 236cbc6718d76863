// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Cycle-accurate model of a 2D mesh interconnection network.
//!
//! Processors inject messages split into packets and flits, routers forward
//! them hop-by-hop under virtual-channel flow control, and every cycle runs
//! as five globally-barriered phases over the [network::Network] arena. The
//! routing and flow-control algorithms are selected once at setup via the
//! enums in [routing] and [flow_control].

pub mod buffer;
pub mod channel;
pub mod context;
pub mod flow_control;
pub mod message;
pub mod network;
pub mod processor;
pub mod router;
pub mod routing;
pub mod types;
