//! # tilecache - Offline-Tolerant Map Tile Cache
//!
//! Local cache for raster map tiles in the Web Mercator XYZ scheme, for
//! clients that must keep showing a map when the network goes away.
//!
//! ## Features
//!
//! - **Offline first**: Fresh tiles never touch the network; stale tiles are
//!   served whenever a newer copy cannot be obtained
//! - **Never evicts**: Tiles on disk only go away when the cache is cleared
//! - **Region prefetch**: Warm the cache for an area before going offline,
//!   capped and batched so a tile server is never flooded
//! - **Pluggable**: Tile source and connectivity check are traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use tilecache::{GeoPoint, Region, TileServiceBuilder};
//!
//! let service = TileServiceBuilder::new("/var/cache/tiles")
//!     .url_template("https://tile.example.org/{z}/{x}/{y}.png")
//!     .build()?;
//!
//! // Before heading out of coverage
//! let trailhead = Region::new(GeoPoint::new(46.8523, -121.7603), 0.1, 0.1);
//! service.prefetch_tiles_for_region(&trailhead, 10, 15)?;
//!
//! // Later, with or without a connection
//! let png = service.get_tile(13, 1324, 2880)?;
//! ```
//!
//! ## Tile Lookup
//!
//! 1. Fresh cached copy (younger than seven days by default)
//! 2. Offline: cached copy of any age, else [`TileCacheError::Unavailable`]
//! 3. Online: download and cache; on failure the cached copy of any age,
//!    else [`TileCacheError::FetchFailed`]
//!
//! ## Cargo Features
//!
//! - `download` - HTTP tile source and connectivity probe (reqwest)
//! - `geojson` - GeoJSON export of tile footprints

pub mod coords;
pub mod error;
pub mod fetcher;
pub mod prefetch;
pub mod service;
pub mod source;
pub mod store;
pub mod tile;

#[cfg(feature = "geojson")]
pub mod geojson;

#[cfg(test)]
mod testing;

// Re-export main types at crate root for convenience
pub use coords::{point_to_tile, tile_bounds, tile_to_point, tiles_for_region};
pub use error::{Result, TileCacheError};
pub use fetcher::{FetchStats, FetchedTile, TileFetcher, TileOrigin};
pub use prefetch::{PrefetchJob, PrefetchReport, RegionPrefetcher, BATCH_SIZE, MAX_TILES};
pub use service::{TileService, TileServiceBuilder};
pub use source::{AlwaysOffline, AlwaysOnline, Reachability, TileSource};
pub use store::{CacheStats, TileStore, TileStoreConfig};
pub use tile::{GeoPoint, Region, TileId, MAX_ZOOM};

#[cfg(feature = "download")]
pub use source::{HttpProbe, HttpSourceConfig, HttpTileSource};
