// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::error::Error;
use std::fmt;

/// Index of a node (processor or router) within the [Network](crate::network::Network).
pub type NodeId = usize;

/// Index of a [Channel](crate::channel::Channel) in the network arena.
pub type ChannelId = usize;

/// Index of a [Buffer](crate::buffer::Buffer) in the network arena.
pub type BufferId = usize;

// Simulation errors

#[macro_export]
/// Build a [SimError] from a message that supports `to_string`
macro_rules! sim_error {
    ($msg:expr) => {
        Err($crate::types::SimError($msg.to_string()))?
    };
}

/// The `SimError` is what should be returned in the case of an error
#[derive(Debug)]
pub struct SimError(pub String);

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {}", self.0)
    }
}

impl Error for SimError {}

/// The SimResult is the return type for most simulation functions
pub type SimResult = Result<(), SimError>;

/// Identity of the packet a flit belongs to.
///
/// Message ids are unique across the whole simulation and packet ids are
/// unique within their message, so the pair identifies a packet globally.
/// Channel locks, buffer reservations and cached routes are all keyed on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketKey {
    pub message_id: u32,
    pub packet_id: u32,
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}.p{}", self.message_id, self.packet_id)
    }
}

/// One end of a [Channel](crate::channel::Channel).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Processor(NodeId),
    Router(NodeId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Processor(id) => {
                write!(f, "processor {id}")
            }
            Endpoint::Router(id) => {
                write!(f, "router {id}")
            }
        }
    }
}
