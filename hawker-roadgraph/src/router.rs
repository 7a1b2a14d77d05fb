//! # One-to-many shortest-distance routing
//!
//! The router assembles a query-scoped graph covering the source and all
//! targets, snaps every coordinate to its nearest road node within a snap
//! budget, and runs a single-source Dijkstra ordered by accumulated
//! *distance* (duration rides along but never drives the search). Targets
//! the search cannot settle are answered with a great-circle estimate and
//! marked unreachable.
//!
//! The router is deliberately infallible: when no road data can be loaded
//! at all, or the router is constructed in disabled mode, every target
//! gets the great-circle estimate at a fixed assumed speed.

use crate::cache::GraphCache;
use crate::graph::{NodeId, RoadGraph};
use crate::spatial::{BoundingBox, Coordinate};
use crate::tile_id::TileId;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

/// Coordinates farther than this from any road node are off the network.
pub const SNAP_BUDGET_M: f64 = 500.0;

/// Assumed travel speed for great-circle fallback results.
pub const FALLBACK_SPEED_KMH: f64 = 30.0;

/// Query bounding-box padding in degrees; roughly 500 m.
const BBOX_PADDING_DEG: f64 = 0.005;

/// The answer for one target of a routing query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteResult {
    pub distance_km: f64,
    pub duration_min: f64,
    /// Whether the distance was measured along the road network. A `false`
    /// result still carries a usable great-circle estimate.
    pub reachable: bool,
}

impl RouteResult {
    fn great_circle(source: Coordinate, target: Coordinate, reachable: bool) -> Self {
        let distance_km = source.haversine_distance_m(target) / 1000.0;
        Self {
            distance_km,
            duration_min: distance_km / FALLBACK_SPEED_KMH * 60.0,
            reachable,
        }
    }
}

/// A coordinate projected onto the road network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedNode {
    pub coordinate: Coordinate,
    pub snap_distance_m: f64,
}

pub struct Router {
    cache: Option<Arc<GraphCache>>,
    zoom: u8,
}

impl Router {
    pub fn new(cache: Arc<GraphCache>, zoom: u8) -> Self {
        Self {
            cache: Some(cache),
            zoom,
        }
    }

    /// A router with no tile data; every query answers with great-circle
    /// estimates at [`FALLBACK_SPEED_KMH`].
    pub const fn disabled() -> Self {
        Self {
            cache: None,
            zoom: 0,
        }
    }

    /// Road distance from `source` to each target, in target order.
    ///
    /// The result always has exactly `targets.len()` entries; the i-th entry
    /// answers `targets[i]`.
    pub async fn one_to_many(
        &self,
        source: Coordinate,
        targets: &[Coordinate],
    ) -> Vec<RouteResult> {
        let Some(cache) = &self.cache else {
            return full_fallback(source, targets);
        };
        if targets.is_empty() {
            return Vec::new();
        }

        let mut bbox = BoundingBox::from_point(source);
        for target in targets {
            bbox.extend(*target);
        }
        let tiles = TileId::covering(&bbox.padded(BBOX_PADDING_DEG), self.zoom);
        let graph = cache.assemble(&tiles).await;

        let Some((source_node, source_snap_m)) = snap(&graph, source) else {
            // Without a source on the network the whole query degrades to
            // great-circle estimates.
            return full_fallback(source, targets);
        };

        let snapped_targets: Vec<Option<(NodeId, f64)>> =
            targets.iter().map(|t| snap(&graph, *t)).collect();
        let target_nodes: Vec<NodeId> = snapped_targets
            .iter()
            .flatten()
            .map(|(node, _)| *node)
            .collect();

        let settled = one_to_many_on_graph(&graph, source_node, &target_nodes);

        targets
            .iter()
            .zip(&snapped_targets)
            .map(|(&target, snapped)| match *snapped {
                Some((node, target_snap_m)) => match settled.get(&node) {
                    Some(&(path_m, path_s)) => RouteResult {
                        distance_km: (path_m + source_snap_m + target_snap_m) / 1000.0,
                        duration_min: path_s / 60.0,
                        reachable: true,
                    },
                    None => RouteResult::great_circle(source, target, false),
                },
                None => RouteResult::great_circle(source, target, false),
            })
            .collect()
    }

    /// Convenience wrapper for a single target.
    pub async fn calculate_distance(&self, source: Coordinate, target: Coordinate) -> RouteResult {
        self.one_to_many(source, [target].as_slice())
            .await
            .pop()
            .expect("one_to_many returns one result per target")
    }

    /// Snaps `coord` to the nearest road node, searching the 3x3 tile
    /// neighborhood around it. `None` when no node is within the snap
    /// budget (or the router is disabled).
    pub async fn find_nearest_node(&self, coord: Coordinate) -> Option<SnappedNode> {
        let cache = self.cache.as_ref()?;
        let tiles = TileId::for_coordinate(coord, self.zoom).neighbors_3x3();
        let graph = cache.assemble(&tiles).await;
        let (node, snap_distance_m) = snap(&graph, coord)?;
        Some(SnappedNode {
            coordinate: graph.coordinate(node),
            snap_distance_m,
        })
    }
}

fn full_fallback(source: Coordinate, targets: &[Coordinate]) -> Vec<RouteResult> {
    targets
        .iter()
        .map(|&t| RouteResult::great_circle(source, t, true))
        .collect()
}

fn snap(graph: &RoadGraph, coord: Coordinate) -> Option<(NodeId, f64)> {
    graph
        .nearest_node(coord)
        .filter(|&(_, distance)| distance <= SNAP_BUDGET_M)
}

/// Single-source Dijkstra over an assembled graph, settling `targets`.
///
/// The priority queue orders by accumulated distance in meters; that
/// ordering *defines* "shortest" for this system. Durations are carried
/// along the winning paths. Search stops once every requested target is
/// settled or the queue drains. Returns path distance and duration for each
/// settled target node.
pub fn one_to_many_on_graph(
    graph: &RoadGraph,
    source: NodeId,
    targets: &[NodeId],
) -> HashMap<NodeId, (f64, f64)> {
    let mut remaining: HashSet<NodeId> = targets.iter().copied().collect();
    let mut settled: HashMap<NodeId, (f64, f64)> = HashMap::new();

    let mut best = vec![f64::INFINITY; graph.node_count()];
    let mut visited = vec![false; graph.node_count()];
    let mut queue = BinaryHeap::new();

    best[source.index()] = 0.0;
    queue.push(QueueEntry {
        node: source,
        distance_m: 0.0,
        duration_s: 0.0,
    });

    while let Some(entry) = queue.pop() {
        if visited[entry.node.index()] {
            continue;
        }
        visited[entry.node.index()] = true;

        if remaining.remove(&entry.node) {
            settled.insert(entry.node, (entry.distance_m, entry.duration_s));
            if remaining.is_empty() {
                break;
            }
        }

        for edge in graph.edges_from(entry.node) {
            let next_distance = entry.distance_m + edge.distance_m;
            if next_distance < best[edge.to.index()] {
                best[edge.to.index()] = next_distance;
                queue.push(QueueEntry {
                    node: edge.to,
                    distance_m: next_distance,
                    duration_s: entry.duration_s + edge.duration_s,
                });
            }
        }
    }

    settled
}

/// Min-heap entry ordered by accumulated distance.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    node: NodeId,
    distance_m: f64,
    duration_s: f64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance_m.total_cmp(&other.distance_m) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the std max-heap pops the smallest distance.
        other.distance_m.total_cmp(&self.distance_m)
    }
}
