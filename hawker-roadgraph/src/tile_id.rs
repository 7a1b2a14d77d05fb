//! # Web-Mercator tile addressing
//!
//! Tiles are addressed by `(z, x, y)` in the standard slippy-map scheme:
//! `x` grows eastward from the antimeridian, `y` grows southward from the
//! north pole. The routing zoom is fixed by configuration, so most of this
//! crate only ever deals in a single `z`.

use crate::spatial::{BoundingBox, Coordinate};
use std::fmt::{Display, Formatter};

/// Latitude bound of the Web-Mercator projection domain.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// A single Web-Mercator tile address.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// The tile containing `coord` at zoom `z`.
    ///
    /// Latitudes outside the Web-Mercator domain clamp to the top/bottom row.
    pub fn for_coordinate(coord: Coordinate, z: u8) -> Self {
        let n = f64::from(1u32 << z);
        let lat = coord.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
        let lat_rad = lat.to_radians();

        let x = ((coord.lng + 180.0) / 360.0 * n).floor();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
            * n)
            .floor();

        #[expect(clippy::cast_possible_truncation)]
        #[expect(clippy::cast_sign_loss)]
        Self {
            z,
            x: (x.clamp(0.0, n - 1.0)) as u32,
            y: (y.clamp(0.0, n - 1.0)) as u32,
        }
    }

    /// The geographic bounds of this tile.
    pub fn bounds(self) -> BoundingBox {
        let n = f64::from(1u32 << self.z);
        let west = f64::from(self.x) / n * 360.0 - 180.0;
        let east = f64::from(self.x + 1) / n * 360.0 - 180.0;
        BoundingBox {
            south: mercator_row_to_lat(f64::from(self.y + 1), n),
            west,
            north: mercator_row_to_lat(f64::from(self.y), n),
            east,
        }
    }

    /// This tile and its eight neighbors (fewer at the poles; `x` wraps at
    /// the antimeridian).
    pub fn neighbors_3x3(self) -> Vec<Self> {
        let n = i64::from(1u32 << self.z);
        let mut out = Vec::with_capacity(9);
        for dy in -1..=1i64 {
            let y = i64::from(self.y) + dy;
            if y < 0 || y >= n {
                continue;
            }
            for dx in -1..=1i64 {
                let x = (i64::from(self.x) + dx).rem_euclid(n);
                #[expect(clippy::cast_possible_truncation)]
                #[expect(clippy::cast_sign_loss)]
                out.push(Self::new(self.z, x as u32, y as u32));
            }
        }
        out.dedup();
        out
    }

    /// Every tile at zoom `z` intersecting `bbox`, in row-major order.
    ///
    /// The caller is responsible for keeping the box a few kilometers across;
    /// the tile count grows with its area.
    pub fn covering(bbox: &BoundingBox, z: u8) -> Vec<Self> {
        let nw = Self::for_coordinate(Coordinate::new(bbox.north, bbox.west), z);
        let se = Self::for_coordinate(Coordinate::new(bbox.south, bbox.east), z);

        let mut out = Vec::new();
        for y in nw.y..=se.y {
            for x in nw.x..=se.x {
                out.push(Self::new(z, x, y));
            }
        }
        out
    }
}

impl Display for TileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inverse Web-Mercator: the latitude of a tile row boundary.
fn mercator_row_to_lat(row: f64, n: f64) -> f64 {
    let t = std::f64::consts::PI * (1.0 - 2.0 * row / n);
    t.sinh().atan().to_degrees()
}
