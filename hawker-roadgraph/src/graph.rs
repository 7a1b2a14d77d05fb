//! # The road graph
//!
//! A directed, weighted adjacency-list graph over WGS84 coordinates.
//! Nodes are coalesced by a coordinate key rounded to five decimal places
//! (about one meter), which is what lets graphs built from adjacent tiles
//! fuse at their shared boundary vertices when merged.
//!
//! Two lifecycles share this type: immutable per-tile graphs owned by the
//! cache, and ephemeral query-scoped graphs assembled by merging several
//! tile graphs. Merging always remaps source ids into the target's id space
//! and never mutates the source.

use crate::RoadSegment;
use crate::spatial::Coordinate;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Dense node identifier, valid only within the graph that issued it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A coordinate rounded to five decimal places, used to coalesce nodes.
///
/// Stored as scaled integers so equality and hashing are exact; rounding
/// happens once, at construction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CoordKey {
    lat_e5: i64,
    lng_e5: i64,
}

impl CoordKey {
    pub fn new(c: Coordinate) -> Self {
        Self {
            lat_e5: round_e5(c.lat),
            lng_e5: round_e5(c.lng),
        }
    }
}

impl Display for CoordKey {
    #[expect(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.5},{:.5}",
            self.lat_e5 as f64 / 1e5,
            self.lng_e5 as f64 / 1e5
        )
    }
}

#[expect(clippy::cast_possible_truncation)]
fn round_e5(v: f64) -> i64 {
    (v * 1e5).round() as i64
}

/// A directed edge; attached to its `from` node's adjacency list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: NodeId,
    pub distance_m: f64,
    pub duration_s: f64,
}

#[derive(Debug, Default, Clone)]
pub struct RoadGraph {
    nodes: Vec<Coordinate>,
    edges: Vec<Vec<Edge>>,
    by_key: HashMap<CoordKey, NodeId>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from the road segments of one tile.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a RoadSegment>) -> Self {
        let mut graph = Self::new();
        for segment in segments {
            graph.add_segment(segment);
        }
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The coordinate of `node`. Panics on an id from another graph.
    pub fn coordinate(&self, node: NodeId) -> Coordinate {
        self.nodes[node.index()]
    }

    pub fn edges_from(&self, node: NodeId) -> &[Edge] {
        &self.edges[node.index()]
    }

    /// Every node id in this graph, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        #[expect(clippy::cast_possible_truncation)]
        let count = self.nodes.len() as u32;
        (0..count).map(NodeId)
    }

    /// The node for `coord`'s coordinate key, creating it on first sight.
    ///
    /// Two coordinates whose keys round equal share one node; the stored
    /// coordinate is the first one seen.
    pub fn get_or_create_node(&mut self, coord: Coordinate) -> NodeId {
        let key = CoordKey::new(coord);
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        #[expect(clippy::cast_possible_truncation)]
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(coord);
        self.edges.push(Vec::new());
        self.by_key.insert(key, id);
        id
    }

    /// Adds one road segment: an edge per consecutive vertex pair, plus the
    /// reverse edge with identical weights when the segment is two-way.
    pub fn add_segment(&mut self, segment: &RoadSegment) {
        let speed_ms = segment.speed_kmh / 3.6;
        for pair in segment.points.windows(2) {
            let (p, q) = (pair[0], pair[1]);
            let from = self.get_or_create_node(p);
            let to = self.get_or_create_node(q);
            if from == to {
                // Sub-meter stub; both vertices rounded onto one node.
                continue;
            }
            let distance_m = p.haversine_distance_m(q);
            let duration_s = distance_m / speed_ms;
            self.push_edge(from, to, distance_m, duration_s);
            if !segment.one_way {
                self.push_edge(to, from, distance_m, duration_s);
            }
        }
    }

    fn push_edge(&mut self, from: NodeId, to: NodeId, distance_m: f64, duration_s: f64) {
        self.edges[from.index()].push(Edge {
            to,
            distance_m,
            duration_s,
        });
    }

    /// Stitches `source` into this graph.
    ///
    /// Every source node is remapped through this graph's coordinate-key
    /// table, so nodes on a shared tile boundary fuse into a single node and
    /// edges crossing the boundary become traversable. Edge weights carry
    /// over unchanged. The source is never mutated.
    pub fn merge(&mut self, source: &RoadGraph) {
        let id_map: Vec<NodeId> = source
            .nodes
            .iter()
            .map(|&coord| self.get_or_create_node(coord))
            .collect();

        for (from, adjacency) in source.edges.iter().enumerate() {
            for edge in adjacency {
                self.push_edge(
                    id_map[from],
                    id_map[edge.to.index()],
                    edge.distance_m,
                    edge.duration_s,
                );
            }
        }
    }

    /// The node closest to `coord` by great-circle distance, with that
    /// distance in meters. `None` on an empty graph.
    pub fn nearest_node(&self, coord: Coordinate) -> Option<(NodeId, f64)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, &node_coord)| {
                #[expect(clippy::cast_possible_truncation)]
                let id = NodeId(i as u32);
                (id, coord.haversine_distance_m(node_coord))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
