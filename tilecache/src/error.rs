//! Error types for the tilecache library.

use std::path::PathBuf;
use thiserror::Error;

use crate::tile::{Region, TileId};

/// Errors that can occur when resolving, fetching or caching tiles.
#[derive(Error, Debug)]
pub enum TileCacheError {
    /// IO error when reading or writing cache files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile is not present in the local store.
    #[error("Tile not found in cache: {tile}")]
    NotFound { tile: TileId },

    /// Offline and the tile has never been cached.
    #[error("Tile {tile} unavailable: no network connection and tile not in cache")]
    Unavailable { tile: TileId },

    /// The tile source failed and no cached copy could stand in for it.
    #[error("Failed to fetch tile {tile}: {reason}")]
    FetchFailed { tile: TileId, reason: String },

    /// The cache directory could not be created or removed.
    #[error("Cache directory error at {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tile coordinates outside the grid of their zoom level.
    #[error("Invalid tile: zoom={zoom}, x={x}, y={y} (valid: zoom 0-22, x and y below 2^zoom)")]
    InvalidTile { zoom: u8, x: u32, y: u32 },

    /// Region with a non-positive span or a center off the globe.
    #[error("Invalid region: {region:?} (spans must be positive, center within ±90/±180)")]
    InvalidRegion { region: Region },

    /// Zoom range that is inverted or exceeds the tiling scheme.
    #[error("Invalid zoom range: {min_zoom}..={max_zoom} (valid: min <= max <= 22)")]
    InvalidZoomRange { min_zoom: u8, max_zoom: u8 },

    /// Configuration that cannot be used to build a service.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using [`TileCacheError`].
pub type Result<T> = std::result::Result<T, TileCacheError>;
