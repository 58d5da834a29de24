//! Tile identifiers and geographic value types.
//!
//! # Cache Key Format
//!
//! Tiles are keyed on disk by `{zoom}_{x}_{y}`, e.g. `12_2200_1343`. The key
//! is stable across releases: it is the file stem of every cached tile.

use std::fmt;

use crate::error::{Result, TileCacheError};

/// Deepest zoom level accepted by the checked constructors.
pub const MAX_ZOOM: u8 = 22;

/// A tile in the Web Mercator (XYZ / slippy map) grid.
///
/// Invariant: `x < 2^zoom` and `y < 2^zoom`. Use [`TileId::new`] when the
/// coordinates come from outside the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Zoom level; the grid has `2^zoom × 2^zoom` tiles.
    pub zoom: u8,
    /// Column, counted eastwards from the antimeridian.
    pub x: u32,
    /// Row, counted southwards from the northern edge.
    pub y: u32,
}

impl TileId {
    /// Create a tile identifier, validating it against the grid.
    ///
    /// # Examples
    ///
    /// ```
    /// use tilecache::TileId;
    ///
    /// assert!(TileId::new(1, 1, 1).is_ok());
    /// assert!(TileId::new(1, 2, 0).is_err());
    /// ```
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self> {
        if zoom > MAX_ZOOM || x >= grid_size(zoom) || y >= grid_size(zoom) {
            return Err(TileCacheError::InvalidTile { zoom, x, y });
        }
        Ok(Self { zoom, x, y })
    }

    /// The cache key for this tile, `{zoom}_{x}_{y}`.
    ///
    /// ```
    /// use tilecache::TileId;
    ///
    /// let tile = TileId::new(12, 2200, 1343).unwrap();
    /// assert_eq!(tile.cache_key(), "12_2200_1343");
    /// ```
    pub fn cache_key(&self) -> String {
        format!("{}_{}_{}", self.zoom, self.x, self.y)
    }

    /// Parse a cache key (or a cached file name) back into a tile.
    ///
    /// Accepts an optional directory prefix and an optional extension.
    /// Returns `None` for anything that is not a valid tile.
    ///
    /// ```
    /// use tilecache::TileId;
    ///
    /// assert_eq!(TileId::from_key("3_4_2"), TileId::new(3, 4, 2).ok());
    /// assert_eq!(TileId::from_key("/cache/3_4_2.png"), TileId::new(3, 4, 2).ok());
    /// assert_eq!(TileId::from_key("3_8_2"), None);
    /// ```
    pub fn from_key(key: &str) -> Option<Self> {
        let name = key.rsplit(['/', '\\']).next().unwrap_or(key);
        let stem = match name.split_once('.') {
            Some((stem, _)) => stem,
            None => name,
        };

        let mut parts = stem.split('_');
        let zoom: u8 = parts.next()?.parse().ok()?;
        let x: u32 = parts.next()?.parse().ok()?;
        let y: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Self::new(zoom, x, y).ok()
    }

    /// Substitute this tile into a `{z}/{x}/{y}` URL template.
    pub fn fill_template(&self, template: &str) -> String {
        template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`.
pub fn grid_size(zoom: u8) -> u32 {
    1u32.checked_shl(zoom as u32).unwrap_or(u32::MAX)
}

/// A geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude, -90 to 90.
    pub latitude: f64,
    /// Longitude, -180 to 180.
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components lie within their geographic ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A bounding box described by its center and its angular extent.
///
/// The box covers `center.latitude ± latitude_span / 2` and
/// `center.longitude ± longitude_span / 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub center: GeoPoint,
    /// Total north-south extent in degrees.
    pub latitude_span: f64,
    /// Total east-west extent in degrees.
    pub longitude_span: f64,
}

impl Region {
    pub fn new(center: GeoPoint, latitude_span: f64, longitude_span: f64) -> Self {
        Self {
            center,
            latitude_span,
            longitude_span,
        }
    }

    /// Build a region from its edges.
    ///
    /// # Arguments
    ///
    /// * `south` - Southern boundary latitude
    /// * `west` - Western boundary longitude
    /// * `north` - Northern boundary latitude
    /// * `east` - Eastern boundary longitude
    pub fn from_bounds(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            center: GeoPoint::new((north + south) / 2.0, (east + west) / 2.0),
            latitude_span: north - south,
            longitude_span: east - west,
        }
    }

    pub fn north(&self) -> f64 {
        self.center.latitude + self.latitude_span / 2.0
    }

    pub fn south(&self) -> f64 {
        self.center.latitude - self.latitude_span / 2.0
    }

    pub fn west(&self) -> f64 {
        self.center.longitude - self.longitude_span / 2.0
    }

    pub fn east(&self) -> f64 {
        self.center.longitude + self.longitude_span / 2.0
    }

    /// Whether the spans are positive and the center is a valid position.
    pub fn is_valid(&self) -> bool {
        self.center.is_valid() && self.latitude_span > 0.0 && self.longitude_span > 0.0
    }
}
