// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Messages, packets and flits.
//!
//! A message is split into fixed-width packets and each packet into flits:
//! one HEAD carrying the routing fields, a run of DATA flits, and one TAIL
//! that releases the resources the HEAD acquired along the path.

use std::fmt;

use crate::types::{NodeId, PacketKey};

/// Payload classification of a [Flit].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlitKind {
    /// Leads a packet; carries the routing fields and accumulates the
    /// distance travelled in channels.
    Head {
        source: NodeId,
        dest: NodeId,
        distance: u32,
    },
    Data,
    /// Closes a packet; releases channel locks and buffer reservations.
    Tail { source: NodeId, dest: NodeId },
}

impl FlitKind {
    pub fn is_head(&self) -> bool {
        matches!(self, FlitKind::Head { .. })
    }

    pub fn is_tail(&self) -> bool {
        matches!(self, FlitKind::Tail { .. })
    }
}

impl fmt::Display for FlitKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlitKind::Head { .. } => {
                write!(f, "Head")
            }
            FlitKind::Data => {
                write!(f, "Data")
            }
            FlitKind::Tail { .. } => {
                write!(f, "Tail")
            }
        }
    }
}

/// The unit of channel transmission: one flit crosses one channel per cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flit {
    pub key: PacketKey,
    /// Position within the packet: 0 for HEAD through to the TAIL.
    pub flit_id: u32,
    pub kind: FlitKind,
    /// Packets in the parent message, used to average per-packet distance
    /// into a per-message figure on delivery.
    pub num_packets: u32,
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} flit {}.f{}", self.kind, self.key, self.flit_id)
    }
}

/// A routing unit: HEAD, a run of DATA flits, and TAIL.
#[derive(Clone, Debug)]
pub struct Packet {
    pub key: PacketKey,
    pub flits: Vec<Flit>,
}

impl Packet {
    fn new(
        key: PacketKey,
        source: NodeId,
        dest: NodeId,
        data_flits: u32,
        num_packets: u32,
    ) -> Self {
        let mut flits = Vec::with_capacity(data_flits as usize + 2);
        flits.push(Flit {
            key,
            flit_id: 0,
            kind: FlitKind::Head {
                source,
                dest,
                distance: 0,
            },
            num_packets,
        });
        for flit_id in 1..=data_flits {
            flits.push(Flit {
                key,
                flit_id,
                kind: FlitKind::Data,
                num_packets,
            });
        }
        flits.push(Flit {
            key,
            flit_id: data_flits + 1,
            kind: FlitKind::Tail { source, dest },
            num_packets,
        });
        Packet { key, flits }
    }
}

/// A transfer between two processors, split into packets at creation.
#[derive(Clone, Debug)]
pub struct Message {
    pub message_id: u32,
    pub source: NodeId,
    pub dest: NodeId,
    /// Size in flow-control units before packetisation.
    pub size: u32,
    pub packets: Vec<Packet>,
}

impl Message {
    /// Split `size` units into `size / packet_width` packets of
    /// `data_flits_per_packet` DATA flits each, plus HEAD and TAIL.
    ///
    /// `size` must be a multiple of `packet_width`; the traffic generator
    /// only produces such sizes.
    pub fn new(
        message_id: u32,
        source: NodeId,
        dest: NodeId,
        size: u32,
        packet_width: u32,
        data_flits_per_packet: u32,
    ) -> Self {
        assert!(
            packet_width > 0 && size % packet_width == 0,
            "message {message_id} size {size} is not a multiple of packet width {packet_width}"
        );
        let num_packets = size / packet_width;
        let packets = (0..num_packets)
            .map(|packet_id| {
                Packet::new(
                    PacketKey {
                        message_id,
                        packet_id,
                    },
                    source,
                    dest,
                    data_flits_per_packet,
                    num_packets,
                )
            })
            .collect();
        Message {
            message_id,
            source,
            dest,
            size,
            packets,
        }
    }

    /// Total flits across all packets.
    pub fn num_flits(&self) -> u32 {
        self.packets.iter().map(|p| p.flits.len() as u32).sum()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "message {} ({} -> {}, size {})",
            self.message_id, self.source, self.dest, self.size
        )
    }
}
