//! Mapbox Vector Tile wire messages (`vector_tile.proto` 2.1), hand-rolled
//! with prost derives. Only the fields the road extractor reads are kept.

/// Geometry type discriminant carried by each feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Layer {
    #[prost(uint32, tag = "15")]
    pub version: u32,
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    /// Property keys, referenced by index from feature tags.
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    /// Property values, referenced by index from feature tags.
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,
    /// Tile-local coordinate range; 4096 when absent.
    #[prost(uint32, optional, tag = "5")]
    pub extent: Option<u32>,
}

impl Layer {
    pub fn extent(&self) -> u32 {
        self.extent.unwrap_or(4096)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    /// Alternating key/value indexes into the layer tables.
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,
    #[prost(enumeration = "GeomType", optional, tag = "3")]
    pub geom_type: Option<i32>,
    /// Command/parameter integer stream.
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

/// A property value; exactly one field is set in well-formed tiles.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}
