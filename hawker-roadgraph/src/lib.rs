#![doc = include_str!("../README.md")]

pub mod cache;
pub mod graph;
pub mod mvt;
pub mod router;
pub mod spatial;
pub mod tile_id;
pub mod tile_store;

// Pub use for re-export without too many levels of hierarchy.
// Most call sites only ever need the handful of types below,
// so this flattens things for better ergonomics.
pub use cache::GraphCache;
pub use router::{RouteResult, Router};
pub use spatial::Coordinate;
pub use tile_id::TileId;
pub use tile_store::{TileFetcher, TileSource, TileStore};

use serde::{Deserialize, Serialize};

/// Road class; broad hierarchies of relative importance.
///
/// These come from the tile's road layer (`class`, `highway`, or `type`
/// property, in that order of preference) and are used to estimate speeds
/// when the tile carries no explicit speed tag.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Service,
    LivingStreet,
    /// Anything we don't recognize. Routable, at a conservative speed.
    Other,
}

impl RoadClass {
    /// Maps a road layer tag value to a class.
    ///
    /// Link variants (`motorway_link` etc.) collapse into their base class,
    /// and a few common synonyms from differently-tagged tilesets are folded in.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim_end_matches("_link") {
            "motorway" => Self::Motorway,
            "trunk" => Self::Trunk,
            "primary" => Self::Primary,
            "secondary" => Self::Secondary,
            "tertiary" => Self::Tertiary,
            "residential" | "minor" | "unclassified" => Self::Residential,
            "service" => Self::Service,
            "living_street" | "living-street" => Self::LivingStreet,
            _ => Self::Other,
        }
    }

    /// The assumed travel speed for this class when the tile has no speed tag.
    pub const fn default_speed_kmh(self) -> f64 {
        match self {
            Self::Motorway => 110.0,
            Self::Trunk => 80.0,
            Self::Primary => 60.0,
            Self::Secondary => 50.0,
            Self::Tertiary => 40.0,
            Self::Residential => 30.0,
            Self::Service | Self::LivingStreet => 20.0,
            Self::Other => 30.0,
        }
    }
}

/// A single routable road segment extracted from one tile.
///
/// An ordered polyline of at least two vertices in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub points: Vec<Coordinate>,
    pub class: RoadClass,
    pub name: Option<String>,
    pub one_way: bool,
    /// Effective speed: the tile's tagged speed if positive,
    /// otherwise the class default.
    pub speed_kmh: f64,
}
