// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Flow-control selection: the admission predicate and the granularity at
//! which channels are granted.
//!
//! The admission predicate decides whether a flit may leave its current
//! buffer. Granularity is orthogonal: under [Packet](FlowControlGranularity::Packet)
//! granularity a HEAD locks its output channel and the TAIL releases it, so
//! a packet crosses a link without re-arbitrating per flit; under
//! [Flit](FlowControlGranularity::Flit) granularity every flit competes for
//! the channel and ordering is kept by the downstream buffer reservation
//! instead.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::buffer::Buffer;
use crate::message::Flit;

/// Admission policy for a flit leaving a buffer.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowControlAlgorithm {
    /// Forward a flit as soon as a downstream slot exists.
    #[default]
    CutThrough,
    /// Hold a packet's HEAD until the whole packet is resident in the
    /// source buffer.
    StoreForward,
}

impl FlowControlAlgorithm {
    /// Whether `flit`, fronting `source`, may be forwarded this cycle.
    pub fn admits(&self, flit: &Flit, source: &Buffer) -> bool {
        match self {
            FlowControlAlgorithm::CutThrough => true,
            FlowControlAlgorithm::StoreForward => {
                !flit.kind.is_head() || source.holds_tail_of(flit.key)
            }
        }
    }
}

/// The unit of channel arbitration.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowControlGranularity {
    /// A HEAD locks the channel for its whole packet.
    #[default]
    Packet,
    /// Every flit arbitrates for the channel on its own.
    Flit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn cut_through_always_admits() {
        let mut buffer = Buffer::new(4);
        let flits = Message::new(0, 0, 1, 4, 4, 1).packets.remove(0).flits;
        buffer.insert_flit(flits[0]).unwrap();
        for flit in &flits {
            assert!(FlowControlAlgorithm::CutThrough.admits(flit, &buffer));
        }
    }

    #[test]
    fn store_forward_holds_the_head_until_the_tail_arrives() {
        let algorithm = FlowControlAlgorithm::StoreForward;
        let mut buffer = Buffer::new(4);
        let flits = Message::new(0, 0, 1, 4, 4, 1).packets.remove(0).flits;

        buffer.insert_flit(flits[0]).unwrap();
        buffer.insert_flit(flits[1]).unwrap();
        assert!(!algorithm.admits(&flits[0], &buffer));
        // DATA and TAIL flits are never held back.
        assert!(algorithm.admits(&flits[1], &buffer));
        assert!(algorithm.admits(&flits[2], &buffer));

        buffer.insert_flit(flits[2]).unwrap();
        assert!(algorithm.admits(&flits[0], &buffer));
    }
}
