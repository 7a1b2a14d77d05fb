//! # Spatial primitives shared across the crate

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees.
///
/// `lat ∈ [-90, 90]`, `lng ∈ [-180, 180]`. Construction does not validate;
/// inputs come from tiles and from already-validated persistence rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in meters.
    pub fn haversine_distance_m(self, other: Self) -> f64 {
        Haversine.distance(Point::from(self), Point::from(other))
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(c: Coordinate) -> Self {
        Point::new(c.lng, c.lat)
    }
}

/// An axis-aligned bounding box in degrees.
///
/// Covers `lat ∈ [south, north]`, `lng ∈ [west, east]`. Antimeridian-wrapping
/// boxes are not supported; query areas here are a few kilometers across.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// The degenerate box containing exactly one point.
    pub const fn from_point(c: Coordinate) -> Self {
        Self {
            south: c.lat,
            west: c.lng,
            north: c.lat,
            east: c.lng,
        }
    }

    /// Grows the box to contain `c`.
    pub fn extend(&mut self, c: Coordinate) {
        self.south = self.south.min(c.lat);
        self.north = self.north.max(c.lat);
        self.west = self.west.min(c.lng);
        self.east = self.east.max(c.lng);
    }

    /// Returns the box padded by `degrees` on every side.
    pub fn padded(self, degrees: f64) -> Self {
        Self {
            south: self.south - degrees,
            west: self.west - degrees,
            north: self.north + degrees,
            east: self.east + degrees,
        }
    }

    /// The tightest box containing every coordinate in `points`.
    ///
    /// Returns `None` for an empty slice.
    pub fn containing(points: &[Coordinate]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::from_point(*first);
        for p in rest {
            bbox.extend(*p);
        }
        Some(bbox)
    }
}
