//! # Tile-graph cache and query-graph assembly
//!
//! One immutable [`RoadGraph`] is built per tile and cached for the life of
//! the process. Routing queries assemble an ephemeral graph by stitching the
//! cached tile graphs covering the query area; the assembled graph is
//! discarded when the query ends.
//!
//! The cache is read-through under a readers-writer lock. Two concurrent
//! misses for the same tile may both fetch and parse it; both store the same
//! immutable content and the last writer wins, so no coordination beyond the
//! lock is needed.

use crate::graph::RoadGraph;
use crate::mvt::{self, TileParseError};
use crate::tile_id::TileId;
use crate::tile_store::{TileFetcher, TileStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Error)]
pub enum GraphCacheError {
    #[error(transparent)]
    Store(#[from] TileStoreError),
    #[error(transparent)]
    Parse(#[from] TileParseError),
}

pub struct GraphCache {
    fetcher: Box<dyn TileFetcher>,
    road_layer: String,
    tiles: RwLock<HashMap<TileId, Arc<RoadGraph>>>,
}

impl GraphCache {
    pub fn new(fetcher: impl TileFetcher + 'static, road_layer: impl Into<String>) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            road_layer: road_layer.into(),
            tiles: RwLock::new(HashMap::new()),
        }
    }

    /// The graph for one tile, building and caching it on first access.
    ///
    /// A tile absent from the archive yields (and caches) an empty graph;
    /// open water is not an error.
    ///
    /// # Errors
    ///
    /// Fails when the tile cannot be fetched or its bytes do not decode.
    pub async fn load_tile(&self, tile: TileId) -> Result<Arc<RoadGraph>, GraphCacheError> {
        if let Some(graph) = self.tiles.read().await.get(&tile) {
            return Ok(Arc::clone(graph));
        }

        let graph = Arc::new(self.build_tile(tile).await?);
        self.tiles
            .write()
            .await
            .insert(tile, Arc::clone(&graph));
        Ok(graph)
    }

    async fn build_tile(&self, tile: TileId) -> Result<RoadGraph, GraphCacheError> {
        let Some(bytes) = self.fetcher.fetch(tile).await? else {
            return Ok(RoadGraph::new());
        };
        let segments = mvt::extract_road_segments(&bytes, tile, &self.road_layer)?;
        Ok(RoadGraph::from_segments(&segments))
    }

    /// Assembles an ephemeral graph covering `tiles`.
    ///
    /// Fail-open: a tile that cannot be loaded is logged and skipped, and
    /// the assembly proceeds with whatever loaded. Missing road data costs
    /// recall (more targets fall back to great-circle estimates), never the
    /// correctness of reported distances.
    pub async fn assemble(&self, tiles: &[TileId]) -> RoadGraph {
        let mut assembled = RoadGraph::new();
        for &tile in tiles {
            match self.load_tile(tile).await {
                Ok(graph) => assembled.merge(&graph),
                Err(error) => {
                    warn!(%tile, %error, "skipping tile in graph assembly");
                }
            }
        }
        assembled
    }
}
