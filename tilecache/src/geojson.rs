//! GeoJSON export of tile footprints.
//!
//! Enable the `geojson` feature to use this module.
//!
//! # Example
//!
//! ```ignore
//! use tilecache::coords::tiles_for_region;
//! use tilecache::geojson::tiles_to_feature_collection;
//!
//! let tiles = tiles_for_region(&region, 10, 12);
//! let collection = tiles_to_feature_collection(&tiles);
//! println!("{}", collection);
//! ```

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use serde_json::Value as JsonValue;

use crate::coords::tile_bounds;
use crate::tile::TileId;

/// The footprint of a tile as a closed GeoJSON polygon ring.
///
/// Coordinates are in GeoJSON order `[lon, lat]`, counter-clockwise starting
/// at the south-west corner.
pub fn tile_polygon(tile: TileId) -> Geometry {
    let bounds = tile_bounds(tile);
    let (south, west, north, east) = (bounds.south(), bounds.west(), bounds.north(), bounds.east());

    Geometry::new(GeoJsonValue::Polygon(vec![vec![
        vec![west, south],
        vec![east, south],
        vec![east, north],
        vec![west, north],
        vec![west, south],
    ]]))
}

/// A tile as a GeoJSON feature.
///
/// The feature carries `zoom`, `x`, `y` and the cache `key` as properties.
pub fn tile_feature(tile: TileId) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("zoom".to_string(), JsonValue::from(tile.zoom));
    properties.insert("x".to_string(), JsonValue::from(tile.x));
    properties.insert("y".to_string(), JsonValue::from(tile.y));
    properties.insert("key".to_string(), JsonValue::from(tile.cache_key()));

    Feature {
        bbox: None,
        geometry: Some(tile_polygon(tile)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// All tiles as one feature collection, in the given order.
pub fn tiles_to_feature_collection(tiles: &[TileId]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: tiles.iter().map(|&tile| tile_feature(tile)).collect(),
        foreign_members: None,
    }
}
