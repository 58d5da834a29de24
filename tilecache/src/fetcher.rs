//! Tile fetching with cache fallback.
//!
//! [`TileFetcher::fetch`] resolves a tile through these tiers, in order:
//!
//! 1. Fresh cached copy - returned without touching the network
//! 2. No network - the cached copy, however old, or [`TileCacheError::Unavailable`]
//! 3. Tile source - the downloaded bytes, which also replace the cached copy
//! 4. Tile source failed - the stale cached copy, or [`TileCacheError::FetchFailed`]
//!
//! The source is asked once per call; there is no retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, TileCacheError};
use crate::source::{Reachability, TileSource};
use crate::store::TileStore;
use crate::tile::TileId;

/// Which tier produced a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileOrigin {
    /// Cached copy within the freshness window.
    FreshCache,
    /// Cached copy past the freshness window, served because no newer copy
    /// could be obtained.
    StaleCache,
    /// Downloaded from the tile source during this call.
    Network,
}

impl TileOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileOrigin::FreshCache => "fresh-cache",
            TileOrigin::StaleCache => "stale-cache",
            TileOrigin::Network => "network",
        }
    }
}

/// Tile bytes together with the tier that produced them.
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub tile: TileId,
    pub bytes: Vec<u8>,
    pub origin: TileOrigin,
    /// Whether the bytes are on disk. Only a downloaded tile whose cache
    /// write failed has this unset.
    pub cached: bool,
}

/// Counters of fetch outcomes since the fetcher was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests answered from a fresh cached copy.
    pub fresh_hits: u64,
    /// Requests answered from a stale cached copy.
    pub stale_served: u64,
    /// Requests answered by the tile source.
    pub network_fetches: u64,
    /// Requests that failed.
    pub failures: u64,
}

/// Resolves tiles through the store, the reachability check and the source.
///
/// Holds no tile state of its own; everything persistent lives in the
/// [`TileStore`].
pub struct TileFetcher {
    store: Arc<TileStore>,
    source: Arc<dyn TileSource>,
    reachability: Arc<dyn Reachability>,
    fresh_hits: AtomicU64,
    stale_served: AtomicU64,
    network_fetches: AtomicU64,
    failures: AtomicU64,
}

impl TileFetcher {
    pub fn new(
        store: Arc<TileStore>,
        source: Arc<dyn TileSource>,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        Self {
            store,
            source,
            reachability,
            fresh_hits: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// The store backing this fetcher.
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Fetch the bytes of a tile.
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::Unavailable`] - offline and never cached
    /// - [`TileCacheError::FetchFailed`] - the source failed and nothing is cached
    pub fn fetch(&self, tile: TileId) -> Result<Vec<u8>> {
        self.fetch_with_origin(tile).map(|fetched| fetched.bytes)
    }

    /// Fetch a tile and report which tier served it.
    pub fn fetch_with_origin(&self, tile: TileId) -> Result<FetchedTile> {
        let result = self.resolve(tile);

        let counter = match &result {
            Ok(fetched) => match fetched.origin {
                TileOrigin::FreshCache => &self.fresh_hits,
                TileOrigin::StaleCache => &self.stale_served,
                TileOrigin::Network => &self.network_fetches,
            },
            Err(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        result
    }

    /// Get fetch statistics.
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn resolve(&self, tile: TileId) -> Result<FetchedTile> {
        if self.store.is_fresh(tile) {
            match self.store.read(tile) {
                Ok(bytes) => {
                    tracing::trace!(tile = %tile, "Serving fresh cached tile");
                    return Ok(FetchedTile {
                        tile,
                        bytes,
                        origin: TileOrigin::FreshCache,
                        cached: true,
                    });
                }
                // Removed between the freshness check and the read
                Err(e) => tracing::debug!(tile = %tile, error = %e, "Fresh tile vanished"),
            }
        }

        if !self.reachability.is_connected() {
            tracing::debug!(tile = %tile, "Offline, falling back to cache");
            return self
                .read_stale(tile)
                .ok_or(TileCacheError::Unavailable { tile });
        }

        match self.source.fetch_tile(tile) {
            Ok(bytes) => {
                let cached = match self.store.write(tile, &bytes) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(tile = %tile, error = %e, "Failed to cache downloaded tile");
                        false
                    }
                };
                Ok(FetchedTile {
                    tile,
                    bytes,
                    origin: TileOrigin::Network,
                    cached,
                })
            }
            Err(e) => {
                let reason = match e {
                    TileCacheError::FetchFailed { reason, .. } => reason,
                    other => other.to_string(),
                };

                match self.read_stale(tile) {
                    Some(stale) => {
                        tracing::warn!(tile = %tile, reason = %reason, "Tile source failed, serving stale copy");
                        Ok(stale)
                    }
                    None => Err(TileCacheError::FetchFailed { tile, reason }),
                }
            }
        }
    }

    /// The cached copy regardless of age, if it can be read.
    fn read_stale(&self, tile: TileId) -> Option<FetchedTile> {
        if !self.store.exists(tile) {
            return None;
        }

        match self.store.read(tile) {
            Ok(bytes) => Some(FetchedTile {
                tile,
                bytes,
                origin: TileOrigin::StaleCache,
                cached: true,
            }),
            Err(e) => {
                tracing::warn!(tile = %tile, error = %e, "Cached tile unreadable");
                None
            }
        }
    }
}
