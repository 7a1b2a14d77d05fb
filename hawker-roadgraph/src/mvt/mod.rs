//! # Road segment extraction from vector tiles
//!
//! Tiles arrive as (optionally gzip-framed) Mapbox Vector Tile protobufs.
//! The extractor looks for the configured road layer, walks its polyline
//! features, and emits [`RoadSegment`]s in WGS84. Tilesets disagree on
//! property naming, so class lookup walks a fallback key list and value
//! coercion is deliberately liberal.

pub mod proto;

use crate::spatial::Coordinate;
use crate::tile_id::TileId;
use crate::{RoadClass, RoadSegment};
use flate2::read::GzDecoder;
use prost::Message;
use proto::{GeomType, Layer, Tile, Value};
use std::io::Read;
use thiserror::Error;

/// Property keys tried, in order, for the road class.
const CLASS_KEYS: [&str; 3] = ["class", "highway", "type"];
/// Property keys tried, in order, for the tagged speed.
const SPEED_KEYS: [&str; 2] = ["maxspeed", "speed"];

#[derive(Debug, Error)]
pub enum TileParseError {
    #[error("tile bytes decode as neither gzip-framed nor plain protobuf: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Extracts the routable road segments of one tile.
///
/// A missing road layer yields an empty list, not an error: many tiles
/// legitimately carry no roads.
///
/// # Errors
///
/// Fails only when the bytes are not a vector tile at all (after trying a
/// gzip-framed decode first, then a plain one).
pub fn extract_road_segments(
    bytes: &[u8],
    tile: TileId,
    road_layer: &str,
) -> Result<Vec<RoadSegment>, TileParseError> {
    let decoded = decode_tile(bytes)?;
    let Some(layer) = decoded.layers.iter().find(|l| l.name == road_layer) else {
        return Ok(Vec::new());
    };

    let extent = f64::from(layer.extent());
    let mut segments = Vec::new();

    for feature in &layer.features {
        if feature.geom_type != Some(GeomType::LineString as i32) {
            continue;
        }

        let props = FeatureProperties {
            layer,
            tags: &feature.tags,
        };
        let class = props
            .first_of(&CLASS_KEYS)
            .and_then(string_value)
            .map_or(RoadClass::Other, RoadClass::from_tag);
        let name = props
            .first_of(&["name"])
            .and_then(string_value)
            .map(ToString::to_string);
        let one_way = props
            .first_of(&["oneway"])
            .and_then(bool_value)
            .unwrap_or(false);
        let tagged_speed = props.first_of(&SPEED_KEYS).and_then(f64_value);
        let speed_kmh = match tagged_speed {
            Some(speed) if speed > 0.0 => speed,
            _ => class.default_speed_kmh(),
        };

        for line in decode_polylines(&feature.geometry) {
            if line.len() < 2 {
                continue;
            }
            let points = line
                .iter()
                .map(|&(x, y)| tile_local_to_coord(tile, extent, x, y))
                .collect();
            segments.push(RoadSegment {
                points,
                class,
                name: name.clone(),
                one_way,
                speed_kmh,
            });
        }
    }

    Ok(segments)
}

/// Gzip-framed decode first, then plain.
fn decode_tile(bytes: &[u8]) -> Result<Tile, TileParseError> {
    let mut inflated = Vec::new();
    if GzDecoder::new(bytes).read_to_end(&mut inflated).is_ok() {
        return Ok(Tile::decode(inflated.as_slice())?);
    }
    Ok(Tile::decode(bytes)?)
}

/// Projects a tile-local integer coordinate into WGS84.
#[expect(clippy::cast_precision_loss)]
fn tile_local_to_coord(tile: TileId, extent: f64, x: i64, y: i64) -> Coordinate {
    let n = f64::from(1u32 << tile.z);
    let lng = (f64::from(tile.x) + x as f64 / extent) / n * 360.0 - 180.0;
    let merc_row = (f64::from(tile.y) + y as f64 / extent) / n;
    let lat = (std::f64::consts::PI * (1.0 - 2.0 * merc_row))
        .sinh()
        .atan()
        .to_degrees();
    Coordinate::new(lat, lng)
}

/// Decodes the MVT command stream into one or more polylines.
///
/// Stops (returning what was decoded so far) on truncated or malformed
/// streams rather than failing the whole tile.
fn decode_polylines(geometry: &[u32]) -> Vec<Vec<(i64, i64)>> {
    const MOVE_TO: u32 = 1;
    const LINE_TO: u32 = 2;
    const CLOSE_PATH: u32 = 7;

    let mut lines: Vec<Vec<(i64, i64)>> = Vec::new();
    let mut cursor = (0i64, 0i64);
    let mut i = 0;

    while i < geometry.len() {
        let command = geometry[i];
        i += 1;
        let op = command & 0x7;
        #[expect(clippy::cast_possible_truncation)]
        let count = (command >> 3) as usize;

        match op {
            MOVE_TO => {
                for _ in 0..count {
                    let Some(&[dx, dy]) = geometry
                        .get(i..i + 2)
                        .and_then(|s| <&[u32; 2]>::try_from(s).ok())
                    else {
                        return lines;
                    };
                    cursor.0 += zigzag(dx);
                    cursor.1 += zigzag(dy);
                    i += 2;
                    lines.push(vec![cursor]);
                }
            }
            LINE_TO => {
                let Some(line) = lines.last_mut() else {
                    return lines;
                };
                for _ in 0..count {
                    let Some(&[dx, dy]) = geometry
                        .get(i..i + 2)
                        .and_then(|s| <&[u32; 2]>::try_from(s).ok())
                    else {
                        return lines;
                    };
                    cursor.0 += zigzag(dx);
                    cursor.1 += zigzag(dy);
                    i += 2;
                    line.push(cursor);
                }
            }
            CLOSE_PATH => {
                // Polygon-only command; carries no parameters.
            }
            _ => return lines,
        }
    }
    lines
}

const fn zigzag(v: u32) -> i64 {
    let v = v as i64;
    (v >> 1) ^ -(v & 1)
}

struct FeatureProperties<'a> {
    layer: &'a Layer,
    tags: &'a [u32],
}

impl FeatureProperties<'_> {
    /// The value for the first of `keys` present on this feature.
    fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.get(key))
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.tags.chunks_exact(2).find_map(|pair| {
            let layer_key = self.layer.keys.get(pair[0] as usize)?;
            if layer_key == key {
                self.layer.values.get(pair[1] as usize)
            } else {
                None
            }
        })
    }
}

fn string_value(v: &Value) -> Option<&str> {
    v.string_value.as_deref()
}

/// `true`/`false` in any of the forms tilesets use: bool, 0/1 integer, or
/// a "yes"/"true"/"1" string.
fn bool_value(v: &Value) -> Option<bool> {
    if let Some(b) = v.bool_value {
        return Some(b);
    }
    if let Some(i) = v.int_value.or(v.sint_value) {
        return Some(i != 0);
    }
    if let Some(u) = v.uint_value {
        return Some(u != 0);
    }
    match v.string_value.as_deref() {
        Some("yes" | "true" | "1") => Some(true),
        Some("no" | "false" | "0") => Some(false),
        _ => None,
    }
}

#[expect(clippy::cast_precision_loss)]
fn f64_value(v: &Value) -> Option<f64> {
    v.double_value
        .or(v.float_value.map(f64::from))
        .or(v.int_value.map(|i| i as f64))
        .or(v.sint_value.map(|i| i as f64))
        .or(v.uint_value.map(|u| u as f64))
        .or_else(|| v.string_value.as_deref().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const TILE: TileId = TileId::new(14, 13724, 7014);

    fn zz(v: i64) -> u32 {
        #[expect(clippy::cast_possible_truncation)]
        #[expect(clippy::cast_sign_loss)]
        let encoded = ((v << 1) ^ (v >> 63)) as u32;
        encoded
    }

    /// A two-point polyline from (0,0) to (100,100) in tile-local space.
    fn simple_line_geometry() -> Vec<u32> {
        vec![9, zz(0), zz(0), (1 << 3) | 2, zz(100), zz(100)]
    }

    fn value_str(s: &str) -> Value {
        Value {
            string_value: Some(s.to_string()),
            ..Value::default()
        }
    }

    fn road_layer(features: Vec<proto::Feature>, keys: Vec<&str>, values: Vec<Value>) -> Layer {
        Layer {
            version: 2,
            name: "transportation".to_string(),
            features,
            keys: keys.into_iter().map(ToString::to_string).collect(),
            values,
            extent: Some(4096),
        }
    }

    fn line_feature(tags: Vec<u32>, geometry: Vec<u32>) -> proto::Feature {
        proto::Feature {
            id: None,
            tags,
            geom_type: Some(GeomType::LineString as i32),
            geometry,
        }
    }

    #[test]
    fn extracts_classed_segment_from_plain_tile() {
        let layer = road_layer(
            vec![line_feature(vec![0, 0], simple_line_geometry())],
            vec!["class"],
            vec![value_str("primary")],
        );
        let tile = Tile {
            layers: vec![layer],
        };
        let segments =
            extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.class, RoadClass::Primary);
        assert_eq!(segment.speed_kmh, 60.0);
        assert!(!segment.one_way);
        assert_eq!(segment.points.len(), 2);

        // First vertex sits at the tile's northwest corner.
        let bounds = TILE.bounds();
        assert!((segment.points[0].lng - bounds.west).abs() < 1e-9);
        assert!((segment.points[0].lat - bounds.north).abs() < 1e-9);
        // The second vertex is inside the tile, south-east of the first.
        assert!(segment.points[1].lng > segment.points[0].lng);
        assert!(segment.points[1].lat < segment.points[0].lat);
    }

    #[test]
    fn gzip_framed_tile_decodes() {
        let layer = road_layer(
            vec![line_feature(vec![0, 0], simple_line_geometry())],
            vec!["highway"],
            vec![value_str("residential")],
        );
        let tile = Tile {
            layers: vec![layer],
        };
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tile.encode_to_vec()).unwrap();
        let gz = encoder.finish().unwrap();

        let segments = extract_road_segments(&gz, TILE, "transportation").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].class, RoadClass::Residential);
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = extract_road_segments(&[0xde, 0xad, 0xbe, 0xef, 0x01], TILE, "transportation");
        assert!(matches!(err, Err(TileParseError::Decode(_))));
    }

    #[test]
    fn missing_layer_is_empty_not_error() {
        let tile = Tile {
            layers: vec![road_layer(vec![], vec![], vec![])],
        };
        let segments = extract_road_segments(&tile.encode_to_vec(), TILE, "roads").unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn points_polygons_and_degenerate_lines_are_skipped() {
        let point = proto::Feature {
            geom_type: Some(GeomType::Point as i32),
            geometry: vec![9, zz(10), zz(10)],
            ..proto::Feature::default()
        };
        let polygon = proto::Feature {
            geom_type: Some(GeomType::Polygon as i32),
            geometry: vec![9, zz(0), zz(0), (2 << 3) | 2, zz(5), zz(0), zz(0), zz(5), 7],
            ..proto::Feature::default()
        };
        // A MoveTo with no following LineTo: a one-vertex "line".
        let degenerate = line_feature(vec![], vec![9, zz(3), zz(3)]);

        let tile = Tile {
            layers: vec![road_layer(vec![point, polygon, degenerate], vec![], vec![])],
        };
        let segments =
            extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn multi_polyline_produces_one_segment_per_line() {
        // Two MoveTo/LineTo runs in one feature.
        let geometry = vec![
            9,
            zz(0),
            zz(0),
            (1 << 3) | 2,
            zz(50),
            zz(0),
            9,
            zz(100),
            zz(100),
            (1 << 3) | 2,
            zz(0),
            zz(50),
        ];
        let tile = Tile {
            layers: vec![road_layer(
                vec![line_feature(vec![0, 0], geometry)],
                vec!["class"],
                vec![value_str("service")],
            )],
        };
        let segments =
            extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.points.len() == 2));
        assert!(segments.iter().all(|s| s.speed_kmh == 20.0));
    }

    #[test]
    fn one_way_coercion_accepts_liberal_forms() {
        for value in [
            Value {
                bool_value: Some(true),
                ..Value::default()
            },
            Value {
                int_value: Some(1),
                ..Value::default()
            },
            value_str("yes"),
            value_str("true"),
            value_str("1"),
        ] {
            let tile = Tile {
                layers: vec![road_layer(
                    vec![line_feature(vec![0, 0, 1, 1], simple_line_geometry())],
                    vec!["class", "oneway"],
                    vec![value_str("tertiary"), value],
                )],
            };
            let segments =
                extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
            assert!(segments[0].one_way, "expected one_way for {:?}", segments[0]);
        }
    }

    #[test]
    fn tagged_speed_wins_over_class_default() {
        let tile = Tile {
            layers: vec![road_layer(
                vec![line_feature(vec![0, 0, 1, 1], simple_line_geometry())],
                vec!["class", "maxspeed"],
                vec![
                    value_str("residential"),
                    Value {
                        uint_value: Some(70),
                        ..Value::default()
                    },
                ],
            )],
        };
        let segments =
            extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
        assert_eq!(segments[0].speed_kmh, 70.0);
    }

    #[test]
    fn nonpositive_tagged_speed_falls_back_to_class() {
        let tile = Tile {
            layers: vec![road_layer(
                vec![line_feature(vec![0, 0, 1, 1], simple_line_geometry())],
                vec!["class", "maxspeed"],
                vec![
                    value_str("trunk"),
                    Value {
                        int_value: Some(0),
                        ..Value::default()
                    },
                ],
            )],
        };
        let segments =
            extract_road_segments(&tile.encode_to_vec(), TILE, "transportation").unwrap();
        assert_eq!(segments[0].speed_kmh, 80.0);
    }
}
