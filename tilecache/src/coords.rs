//! Web Mercator coordinate mapping.
//!
//! Converts geographic positions to XYZ tile identifiers and expands regions
//! into the ordered list of tiles that cover them.
//!
//! # Poles
//!
//! The projection diverges at ±90° latitude. [`point_to_tile`] does not clamp
//! latitude; callers that may pass polar positions should run them through
//! [`clamp_latitude`] first. The computed column and row are kept inside the
//! grid, so `+90°` lands on row 0 and `180°` longitude on the last column,
//! while `-90°` has no meaningful row.

use std::f64::consts::PI;

use crate::tile::{grid_size, GeoPoint, Region, TileId};

/// Northernmost latitude representable in Web Mercator, in degrees.
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Southernmost latitude representable in Web Mercator, in degrees.
pub const MIN_LATITUDE: f64 = -MAX_LATITUDE;

/// Edges closer than this (in tile units) to a tile boundary snap onto it.
const EDGE_EPSILON: f64 = 1e-9;

/// Clamp a latitude into the range covered by the Web Mercator grid.
///
/// ```
/// use tilecache::coords::{clamp_latitude, MAX_LATITUDE};
///
/// assert_eq!(clamp_latitude(90.0), MAX_LATITUDE);
/// assert_eq!(clamp_latitude(45.0), 45.0);
/// ```
pub fn clamp_latitude(latitude: f64) -> f64 {
    latitude.clamp(MIN_LATITUDE, MAX_LATITUDE)
}

/// Fractional grid position of a point, before flooring.
fn grid_position(point: GeoPoint, zoom: u8) -> (f64, f64) {
    let n = grid_size(zoom) as f64;
    let lat_rad = point.latitude * PI / 180.0;

    let x = (point.longitude + 180.0) / 360.0 * n;
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;

    (x, y)
}

/// Keep a floored grid position inside `0..n`. NaN maps to 0.
fn to_index(value: f64, zoom: u8) -> u32 {
    (value.max(0.0) as u32).min(grid_size(zoom) - 1)
}

/// Convert a geographic point to the tile containing it.
///
/// # Arguments
///
/// * `point` - Position in decimal degrees
/// * `zoom` - Zoom level
///
/// # Examples
///
/// ```
/// use tilecache::{coords::point_to_tile, GeoPoint, TileId};
///
/// let tile = point_to_tile(GeoPoint::new(0.0, 0.0), 1);
/// assert_eq!(tile, TileId::new(1, 1, 1).unwrap());
/// ```
pub fn point_to_tile(point: GeoPoint, zoom: u8) -> TileId {
    let (x, y) = grid_position(point, zoom);

    TileId {
        zoom,
        x: to_index(x.floor(), zoom),
        y: to_index(y.floor(), zoom),
    }
}

/// Geographic position of a tile's north-west corner.
pub fn tile_to_point(tile: TileId) -> GeoPoint {
    corner(tile.zoom, tile.x, tile.y)
}

/// The exact geographic extent of a tile.
pub fn tile_bounds(tile: TileId) -> Region {
    let nw = corner(tile.zoom, tile.x, tile.y);
    let se = corner(tile.zoom, tile.x + 1, tile.y + 1);
    Region::from_bounds(se.latitude, nw.longitude, nw.latitude, se.longitude)
}

/// Inverse projection of a grid vertex. `x` and `y` may equal `2^zoom`.
fn corner(zoom: u8, x: u32, y: u32) -> GeoPoint {
    let n = grid_size(zoom) as f64;
    let longitude = x as f64 / n * 360.0 - 180.0;
    let latitude = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan() * 180.0 / PI;
    GeoPoint::new(latitude, longitude)
}

/// Inclusive column/row span of a region at one zoom level.
///
/// The north-west corner selects the first tile, the south-east corner the
/// last. An edge lying exactly on a tile boundary belongs to the tile on its
/// inner side, so a region equal to one tile's extent spans just that tile.
fn region_span(region: &Region, zoom: u8) -> ((u32, u32), (u32, u32)) {
    let (west, north) = grid_position(GeoPoint::new(region.north(), region.west()), zoom);
    let (east, south) = grid_position(GeoPoint::new(region.south(), region.east()), zoom);

    let min_x = to_index((west + EDGE_EPSILON).floor(), zoom);
    let min_y = to_index((north + EDGE_EPSILON).floor(), zoom);
    let max_x = to_index((east - EDGE_EPSILON).ceil() - 1.0, zoom).max(min_x);
    let max_y = to_index((south - EDGE_EPSILON).ceil() - 1.0, zoom).max(min_y);

    ((min_x, max_x), (min_y, max_y))
}

/// All tiles covering a region, for every zoom in `min_zoom..=max_zoom`.
///
/// Tiles are ordered by zoom, then column, then row. The list is fully
/// materialized and can be very large for wide regions or deep zoom ranges;
/// an inverted zoom range yields an empty list.
///
/// # Examples
///
/// ```
/// use tilecache::{coords::tiles_for_region, GeoPoint, Region};
///
/// let world = Region::new(GeoPoint::new(0.0, 0.0), 170.0, 359.0);
/// assert_eq!(tiles_for_region(&world, 0, 1).len(), 1 + 4);
/// ```
pub fn tiles_for_region(region: &Region, min_zoom: u8, max_zoom: u8) -> Vec<TileId> {
    let mut tiles = Vec::new();

    for zoom in min_zoom..=max_zoom {
        let ((min_x, max_x), (min_y, max_y)) = region_span(region, zoom);
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                tiles.push(TileId { zoom, x, y });
            }
        }
    }

    tiles
}

/// Number of tiles [`tiles_for_region`] would return, without building the list.
pub fn tile_count_for_region(region: &Region, min_zoom: u8, max_zoom: u8) -> u64 {
    (min_zoom..=max_zoom)
        .map(|zoom| {
            let ((min_x, max_x), (min_y, max_y)) = region_span(region, zoom);
            ((max_x - min_x) as u64 + 1) * ((max_y - min_y) as u64 + 1)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(zoom: u8, x: u32, y: u32) -> TileId {
        TileId { zoom, x, y }
    }

    /// Region whose edges coincide with a block of tiles.
    fn block(zoom: u8, x: u32, y: u32, cols: u32, rows: u32) -> Region {
        let nw = corner(zoom, x, y);
        let se = corner(zoom, x + cols, y + rows);
        Region::from_bounds(se.latitude, nw.longitude, nw.latitude, se.longitude)
    }

    #[test]
    fn test_origin_at_zoom_1() {
        assert_eq!(point_to_tile(GeoPoint::new(0.0, 0.0), 1), tile(1, 1, 1));
    }

    #[test]
    fn test_zoom_0_is_single_tile() {
        for (lat, lon) in [(0.0, 0.0), (80.0, -170.0), (-80.0, 170.0)] {
            assert_eq!(point_to_tile(GeoPoint::new(lat, lon), 0), tile(0, 0, 0));
        }
    }

    #[test]
    fn test_zoom_1_quadrants() {
        assert_eq!(point_to_tile(GeoPoint::new(45.0, -90.0), 1), tile(1, 0, 0));
        assert_eq!(point_to_tile(GeoPoint::new(45.0, 90.0), 1), tile(1, 1, 0));
        assert_eq!(point_to_tile(GeoPoint::new(-45.0, -90.0), 1), tile(1, 0, 1));
        assert_eq!(point_to_tile(GeoPoint::new(-45.0, 90.0), 1), tile(1, 1, 1));
    }

    #[test]
    fn test_zoom_2_decomposition() {
        // Row 0 at zoom 2 spans roughly 85.05°N to 66.51°N
        assert_eq!(point_to_tile(GeoPoint::new(70.0, -170.0), 2), tile(2, 0, 0));
        assert_eq!(point_to_tile(GeoPoint::new(60.0, -150.0), 2), tile(2, 0, 1));
        assert_eq!(point_to_tile(GeoPoint::new(10.0, 10.0), 2), tile(2, 2, 1));
        assert_eq!(point_to_tile(GeoPoint::new(-70.0, 170.0), 2), tile(2, 3, 3));
    }

    #[test]
    fn test_new_york_city_at_zoom_16() {
        let t = point_to_tile(GeoPoint::new(40.7128, -74.0060), 16);
        assert_eq!(t, tile(16, 19295, 24640));
    }

    #[test]
    fn test_north_pole_lands_on_first_row() {
        let t = point_to_tile(GeoPoint::new(90.0, 0.0), 4);
        assert_eq!(t.y, 0);
    }

    #[test]
    fn test_clamped_south_pole_lands_on_last_row() {
        let t = point_to_tile(GeoPoint::new(clamp_latitude(-90.0), 0.0), 4);
        assert_eq!(t.y, 15);
    }

    #[test]
    fn test_antimeridian_lands_on_last_column() {
        let t = point_to_tile(GeoPoint::new(0.0, 180.0), 3);
        assert_eq!(t.x, 7);
        let t = point_to_tile(GeoPoint::new(0.0, -180.0), 3);
        assert_eq!(t.x, 0);
    }

    #[test]
    fn test_tile_to_point_northwest_corner() {
        let p = tile_to_point(tile(1, 1, 1));
        assert!(p.latitude.abs() < 1e-9);
        assert!(p.longitude.abs() < 1e-9);

        let p = tile_to_point(tile(0, 0, 0));
        assert!((p.latitude - MAX_LATITUDE).abs() < 1e-6);
        assert_eq!(p.longitude, -180.0);
    }

    #[test]
    fn test_point_inside_tile_bounds_maps_back() {
        let original = tile(12, 2200, 1343);
        let bounds = tile_bounds(original);
        assert_eq!(point_to_tile(bounds.center, 12), original);
    }

    #[test]
    fn test_single_tile_region() {
        for t in [tile(0, 0, 0), tile(1, 0, 1), tile(10, 511, 340), tile(16, 19295, 24640)] {
            let region = tile_bounds(t);
            assert_eq!(tiles_for_region(&region, t.zoom, t.zoom), vec![t]);
        }
    }

    #[test]
    fn test_region_order_is_zoom_then_x_then_y() {
        let region = block(3, 2, 5, 2, 2);
        let tiles = tiles_for_region(&region, 3, 4);

        assert_eq!(
            &tiles[..4],
            &[tile(3, 2, 5), tile(3, 2, 6), tile(3, 3, 5), tile(3, 3, 6)]
        );
        // Same extent at zoom 4 is a 4×4 block
        assert_eq!(tiles.len(), 4 + 16);
        assert_eq!(tiles[4], tile(4, 4, 10));
        assert_eq!(tiles[5], tile(4, 4, 11));
        assert_eq!(tiles[19], tile(4, 7, 13));
    }

    #[test]
    fn test_region_is_deterministic() {
        let region = Region::new(GeoPoint::new(48.8566, 2.3522), 0.2, 0.3);
        let first = tiles_for_region(&region, 10, 14);
        let second = tiles_for_region(&region, 10, 14);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_region_has_no_duplicates() {
        let region = Region::new(GeoPoint::new(35.68, 139.76), 1.0, 1.0);
        let tiles = tiles_for_region(&region, 5, 12);
        let unique: std::collections::HashSet<_> = tiles.iter().collect();
        assert_eq!(unique.len(), tiles.len());
    }

    #[test]
    fn test_inverted_zoom_range_is_empty() {
        let region = Region::new(GeoPoint::new(0.0, 0.0), 1.0, 1.0);
        assert!(tiles_for_region(&region, 5, 4).is_empty());
        assert_eq!(tile_count_for_region(&region, 5, 4), 0);
    }

    #[test]
    fn test_block_counts() {
        assert_eq!(tiles_for_region(&block(10, 100, 200, 37, 1), 10, 10).len(), 37);
        assert_eq!(tiles_for_region(&block(12, 1000, 1500, 25, 40), 12, 12).len(), 1000);
    }

    #[test]
    fn test_tile_count_matches_list() {
        let region = Region::new(GeoPoint::new(-33.86, 151.21), 0.5, 0.8);
        for (min, max) in [(0, 0), (3, 8), (10, 13)] {
            assert_eq!(
                tile_count_for_region(&region, min, max),
                tiles_for_region(&region, min, max).len() as u64
            );
        }
    }

    #[test]
    fn test_all_region_tiles_are_valid() {
        let region = Region::new(GeoPoint::new(0.0, 0.0), 170.0, 360.0);
        for t in tiles_for_region(&region, 0, 4) {
            assert!(TileId::new(t.zoom, t.x, t.y).is_ok(), "{} outside grid", t);
        }
    }
}
