// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Mesh routing: coordinate bookkeeping, the per-packet path cache and the
//! next-hop algorithms.
//!
//! Only a HEAD flit ever resolves a route. The decision is cached per packet
//! and the packet's DATA and TAIL flits read the cache, so every flit of a
//! packet takes the identical path. The entry is erased when the TAIL leaves
//! the router.

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::message::{Flit, FlitKind};
use crate::types::{NodeId, PacketKey};

/// Rectangular mesh coordinates. Vertex ids are assigned row-major, so
/// vertex `v` sits at `(v % cols, v / cols)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MeshTopology {
    pub rows: usize,
    pub cols: usize,
}

impl MeshTopology {
    pub fn new(rows: usize, cols: usize) -> Self {
        assert!(rows > 0 && cols > 0, "degenerate mesh {rows}x{cols}");
        MeshTopology { rows, cols }
    }

    pub fn num_vertices(&self) -> usize {
        self.rows * self.cols
    }

    pub fn coords(&self, vertex: NodeId) -> (usize, usize) {
        assert!(vertex < self.num_vertices(), "vertex {vertex} out of range");
        (vertex % self.cols, vertex / self.cols)
    }

    pub fn vertex(&self, x: usize, y: usize) -> NodeId {
        assert!(x < self.cols && y < self.rows, "({x}, {y}) out of range");
        y * self.cols + x
    }

    /// The neighbour one hop along X toward `dest`.
    fn step_x(&self, from: NodeId, dest: NodeId) -> NodeId {
        let (fx, fy) = self.coords(from);
        let (dx, _) = self.coords(dest);
        match dx.cmp(&fx) {
            std::cmp::Ordering::Less => self.vertex(fx - 1, fy),
            std::cmp::Ordering::Greater => self.vertex(fx + 1, fy),
            std::cmp::Ordering::Equal => panic!("no X gap between {from} and {dest}"),
        }
    }

    /// The neighbour one hop along Y toward `dest`.
    fn step_y(&self, from: NodeId, dest: NodeId) -> NodeId {
        let (fx, fy) = self.coords(from);
        let (_, dy) = self.coords(dest);
        match dy.cmp(&fy) {
            std::cmp::Ordering::Less => self.vertex(fx, fy - 1),
            std::cmp::Ordering::Greater => self.vertex(fx, fy + 1),
            std::cmp::Ordering::Equal => panic!("no Y gap between {from} and {dest}"),
        }
    }
}

/// Per-router memo of the next hop chosen for each in-flight packet.
#[derive(Debug, Default)]
pub struct PathCache {
    routes: BTreeMap<PacketKey, NodeId>,
}

impl PathCache {
    pub fn cached(&self, key: PacketKey) -> Option<NodeId> {
        self.routes.get(&key).copied()
    }

    fn insert(&mut self, key: PacketKey, next_hop: NodeId) {
        self.routes.insert(key, next_hop);
    }

    /// Drop the entry for a packet whose TAIL has departed.
    ///
    /// # Panics
    ///
    /// Panics if there is no entry; the TAIL cannot leave a router its HEAD
    /// was never routed through.
    pub fn erase(&mut self, key: PacketKey) {
        if self.routes.remove(&key).is_none() {
            panic!("no cached route to erase for {key}");
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Occupancy snapshot of the routers one hop away, taken at the start of a
/// tx phase: `true` means the neighbour has at least one unreserved,
/// non-full buffer on the channel from here.
pub type NeighbourVacancy = [(NodeId, bool)];

fn has_vacancy(vacancy: &NeighbourVacancy, neighbour: NodeId) -> bool {
    vacancy
        .iter()
        .find(|(id, _)| *id == neighbour)
        .map(|(_, free)| *free)
        .unwrap_or(false)
}

/// Next-hop selection policy.
#[derive(ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingAlgorithm {
    /// Close the X gap, then the Y gap.
    #[default]
    MeshXy,
    /// Close the Y gap, then the X gap.
    MeshYx,
    /// Minimal adaptive: when both gaps are open, take whichever dimension
    /// has buffer space downstream, preferring X on a tie.
    MeshAdaptive,
}

impl RoutingAlgorithm {
    /// Resolve the next hop for `flit` at router `current`, or `current`
    /// itself when the flit is due for ejection here.
    ///
    /// A HEAD resolves and caches; DATA and TAIL read the cache. A repeated
    /// HEAD lookup (a stalled proposal retried next cycle) also reads the
    /// cache, so retries cannot diverge from the recorded path.
    ///
    /// # Panics
    ///
    /// Panics on a DATA or TAIL flit with no cached entry.
    pub fn next_hop(
        &self,
        flit: &Flit,
        current: NodeId,
        topology: &MeshTopology,
        cache: &mut PathCache,
        vacancy: &NeighbourVacancy,
    ) -> NodeId {
        if let Some(next_hop) = cache.cached(flit.key) {
            return next_hop;
        }
        let FlitKind::Head { dest, .. } = flit.kind else {
            panic!("no cached route for {flit} at router {current}");
        };
        let next_hop = if dest == current {
            current
        } else {
            self.pick(current, dest, topology, vacancy)
        };
        cache.insert(flit.key, next_hop);
        next_hop
    }

    fn pick(
        &self,
        current: NodeId,
        dest: NodeId,
        topology: &MeshTopology,
        vacancy: &NeighbourVacancy,
    ) -> NodeId {
        let (cx, cy) = topology.coords(current);
        let (dx, dy) = topology.coords(dest);
        match self {
            RoutingAlgorithm::MeshXy => {
                if cx != dx {
                    topology.step_x(current, dest)
                } else {
                    topology.step_y(current, dest)
                }
            }
            RoutingAlgorithm::MeshYx => {
                if cy != dy {
                    topology.step_y(current, dest)
                } else {
                    topology.step_x(current, dest)
                }
            }
            RoutingAlgorithm::MeshAdaptive => {
                if cx == dx {
                    topology.step_y(current, dest)
                } else if cy == dy {
                    topology.step_x(current, dest)
                } else {
                    let x_hop = topology.step_x(current, dest);
                    let y_hop = topology.step_y(current, dest);
                    if has_vacancy(vacancy, x_hop) {
                        x_hop
                    } else if has_vacancy(vacancy, y_hop) {
                        y_hop
                    } else {
                        x_hop
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn topology() -> MeshTopology {
        MeshTopology::new(3, 3)
    }

    fn head(message_id: u32, source: NodeId, dest: NodeId) -> Flit {
        Message::new(message_id, source, dest, 4, 4, 1).packets[0].flits[0]
    }

    #[test]
    fn coordinates_are_row_major() {
        let topology = topology();
        assert_eq!(topology.coords(0), (0, 0));
        assert_eq!(topology.coords(5), (2, 1));
        assert_eq!(topology.vertex(1, 2), 7);
    }

    #[test]
    fn xy_closes_the_x_gap_first() {
        let mut cache = PathCache::default();
        let flit = head(0, 0, 8);
        let hop = RoutingAlgorithm::MeshXy.next_hop(&flit, 0, &topology(), &mut cache, &[]);
        assert_eq!(hop, 1);
    }

    #[test]
    fn yx_closes_the_y_gap_first() {
        let mut cache = PathCache::default();
        let flit = head(0, 0, 8);
        let hop = RoutingAlgorithm::MeshYx.next_hop(&flit, 0, &topology(), &mut cache, &[]);
        assert_eq!(hop, 3);
    }

    #[test]
    fn adaptive_takes_the_free_dimension_and_prefers_x() {
        let topology = topology();
        let flit = head(0, 0, 8);
        for (vacancy, expected) in [
            (vec![(1, true), (3, true)], 1),
            (vec![(1, false), (3, true)], 3),
            (vec![(1, false), (3, false)], 1),
        ] {
            let mut cache = PathCache::default();
            let hop =
                RoutingAlgorithm::MeshAdaptive.next_hop(&flit, 0, &topology, &mut cache, &vacancy);
            assert_eq!(hop, expected);
        }
    }

    #[test]
    fn data_and_tail_follow_the_cached_head_route() {
        let mut cache = PathCache::default();
        let topology = topology();
        let flits = Message::new(0, 0, 8, 4, 4, 1).packets.remove(0).flits;
        let algorithm = RoutingAlgorithm::MeshXy;
        let hop = algorithm.next_hop(&flits[0], 0, &topology, &mut cache, &[]);
        for flit in &flits[1..] {
            assert_eq!(algorithm.next_hop(flit, 0, &topology, &mut cache, &[]), hop);
        }
        cache.erase(flits[0].key);
        assert!(cache.is_empty());
    }

    #[test]
    fn ejection_at_the_destination_caches_self() {
        let mut cache = PathCache::default();
        let flit = head(0, 0, 4);
        let hop = RoutingAlgorithm::MeshXy.next_hop(&flit, 4, &topology(), &mut cache, &[]);
        assert_eq!(hop, 4);
        assert_eq!(cache.cached(flit.key), Some(4));
    }

    #[test]
    #[should_panic(expected = "no cached route")]
    fn uncached_data_flit_is_fatal() {
        let mut cache = PathCache::default();
        let flits = Message::new(0, 0, 8, 4, 4, 1).packets.remove(0).flits;
        RoutingAlgorithm::MeshXy.next_hop(&flits[1], 0, &topology(), &mut cache, &[]);
    }

    #[test]
    #[should_panic(expected = "no cached route to erase")]
    fn erasing_an_absent_route_is_fatal() {
        let mut cache = PathCache::default();
        cache.erase(PacketKey {
            message_id: 0,
            packet_id: 0,
        });
    }
}
