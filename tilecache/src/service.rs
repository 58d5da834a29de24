//! High-level tile cache service.
//!
//! [`TileService`] wires a [`TileStore`], a [`TileSource`] and a
//! [`Reachability`] check together and exposes the operations a map view
//! needs: single tiles, the tile list of a region, region prefetching and
//! clearing the cache.
//!
//! # Example
//!
//! ```ignore
//! use tilecache::{GeoPoint, Region, TileServiceBuilder};
//!
//! let service = TileServiceBuilder::new("/var/cache/tiles")
//!     .url_template("https://tile.example.org/{z}/{x}/{y}.png")
//!     .build()?;
//!
//! let png = service.get_tile(12, 2200, 1343)?;
//!
//! let downtown = Region::new(GeoPoint::new(40.7128, -74.0060), 0.05, 0.05);
//! let attempted = service.prefetch_tiles_for_region(&downtown, 12, 15)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::coords::tiles_for_region;
use crate::error::{Result, TileCacheError};
use crate::fetcher::{FetchStats, FetchedTile, TileFetcher};
use crate::prefetch::{PrefetchJob, PrefetchReport, RegionPrefetcher};
use crate::source::{AlwaysOffline, AlwaysOnline, Reachability, TileSource, DEFAULT_TIMEOUT_SECS};
use crate::store::{
    CacheStats, TileStore, TileStoreConfig, DEFAULT_FRESHNESS, DEFAULT_MEMORY_CACHE_BYTES,
};
use crate::tile::{Region, TileId};

#[cfg(feature = "download")]
use crate::source::{HttpProbe, HttpSourceConfig, HttpTileSource};

/// Source used when no tile server is configured. Every request fails.
struct NoSource;

impl TileSource for NoSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>> {
        Err(TileCacheError::FetchFailed {
            tile,
            reason: "no tile source configured".to_string(),
        })
    }
}

/// Offline-tolerant tile cache.
///
/// Tiles are served from the local cache while fresh, refreshed from the tile
/// source when stale, and served stale when the source cannot be reached.
///
/// All methods take `&self`; wrap the service in an [`Arc`] to share it.
///
/// # Example
///
/// ```ignore
/// use tilecache::TileService;
///
/// // Cache-only service: serves whatever is on disk
/// let service = TileService::builder("/var/cache/tiles").build()?;
///
/// match service.get_tile(3, 4, 2) {
///     Ok(bytes) => println!("{} bytes", bytes.len()),
///     Err(e) => eprintln!("{}", e),
/// }
///
/// let stats = service.cache_stats();
/// println!("{} tiles on disk", stats.disk_tiles);
/// ```
pub struct TileService {
    store: Arc<TileStore>,
    fetcher: TileFetcher,
    has_network_source: bool,
}

impl TileService {
    /// Create a builder for a cache rooted at `cache_dir`.
    pub fn builder<P: AsRef<Path>>(cache_dir: P) -> TileServiceBuilder {
        TileServiceBuilder::new(cache_dir)
    }

    /// Get the bytes of a tile.
    ///
    /// # Arguments
    ///
    /// * `zoom` - Zoom level (0-22)
    /// * `x` - Column, below `2^zoom`
    /// * `y` - Row, below `2^zoom`
    ///
    /// # Returns
    ///
    /// - `Ok(bytes)` - the tile, fresh, downloaded or stale
    /// - `Err(InvalidTile)` - coordinates outside the grid
    /// - `Err(Unavailable)` - offline and never cached
    /// - `Err(FetchFailed)` - the source failed and nothing is cached
    pub fn get_tile(&self, zoom: u8, x: u32, y: u32) -> Result<Vec<u8>> {
        self.get_tile_with_origin(zoom, x, y)
            .map(|fetched| fetched.bytes)
    }

    /// Get a tile together with the tier that served it.
    pub fn get_tile_with_origin(&self, zoom: u8, x: u32, y: u32) -> Result<FetchedTile> {
        let tile = TileId::new(zoom, x, y)?;
        self.fetcher.fetch_with_origin(tile)
    }

    /// Tiles covering a region for every zoom in `min_zoom..=max_zoom`.
    ///
    /// Nothing is fetched. An inverted zoom range yields an empty list.
    pub fn get_tiles_for_region(&self, region: &Region, min_zoom: u8, max_zoom: u8) -> Vec<TileId> {
        tiles_for_region(region, min_zoom, max_zoom)
    }

    /// Warm the cache for a region and return the number of tiles attempted.
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::InvalidRegion`] - unusable region
    /// - [`TileCacheError::InvalidZoomRange`] - unusable zoom range
    /// - [`TileCacheError::DirectoryError`] - the cache directory cannot be
    ///   created
    ///
    /// Individual tile failures are never reported as errors.
    pub fn prefetch_tiles_for_region(
        &self,
        region: &Region,
        min_zoom: u8,
        max_zoom: u8,
    ) -> Result<usize> {
        let job = PrefetchJob::new(*region, min_zoom, max_zoom)?;
        self.prefetcher().prefetch(&job)
    }

    /// Warm the cache for a job and report what happened to each tile.
    pub fn prefetch_report(&self, job: &PrefetchJob) -> Result<PrefetchReport> {
        self.prefetcher().prefetch_detailed(job)
    }

    /// Like [`prefetch_report`](Self::prefetch_report), calling
    /// `progress(completed, total)` after every batch.
    pub fn prefetch_with_progress<F>(
        &self,
        job: &PrefetchJob,
        progress: F,
    ) -> Result<PrefetchReport>
    where
        F: FnMut(usize, usize),
    {
        self.prefetcher().prefetch_with_progress(job, progress)
    }

    /// Delete every cached tile.
    ///
    /// Returns `false` if the cache could not be cleared; the failure is
    /// logged.
    pub fn clear_cache(&self) -> bool {
        match self.store.clear() {
            Ok(()) => {
                tracing::info!(cache_dir = %self.cache_dir().display(), "Tile cache cleared");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear tile cache");
                false
            }
        }
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }

    /// Get fetch statistics.
    pub fn fetch_stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    /// Tiles currently on disk, sorted.
    pub fn cached_tiles(&self) -> Vec<TileId> {
        self.store.list_tiles()
    }

    pub fn cache_dir(&self) -> &Path {
        self.store.cache_dir()
    }

    /// The underlying store.
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Whether a tile source was configured. Without one, only cached tiles
    /// can be served.
    pub fn has_network_source(&self) -> bool {
        self.has_network_source
    }

    fn prefetcher(&self) -> RegionPrefetcher<'_> {
        RegionPrefetcher::new(&self.fetcher)
    }
}

/// Builder for creating [`TileService`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tilecache::TileServiceBuilder;
///
/// let service = TileServiceBuilder::new("/var/cache/tiles")
///     .url_template("https://{s}.tile.example.org/{z}/{x}/{y}.png")
///     .user_agent("fieldmap/1.4 (ops@example.org)")
///     .freshness(Duration::from_secs(24 * 60 * 60))
///     .build()?;
/// ```
pub struct TileServiceBuilder {
    cache_dir: PathBuf,
    url_template: Option<String>,
    #[cfg_attr(not(feature = "download"), allow(dead_code))]
    user_agent: Option<String>,
    #[cfg_attr(not(feature = "download"), allow(dead_code))]
    timeout_secs: u64,
    freshness: Duration,
    memory_cache_bytes: u64,
    probe_url: Option<String>,
    offline: bool,
    source: Option<Arc<dyn TileSource>>,
    reachability: Option<Arc<dyn Reachability>>,
}

impl TileServiceBuilder {
    /// Create a new builder with the specified cache directory.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            url_template: None,
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            freshness: DEFAULT_FRESHNESS,
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            probe_url: None,
            offline: false,
            source: None,
            reachability: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `TILECACHE_DIR` | Cache directory | Required |
    /// | `TILECACHE_URL_TEMPLATE` | Tile server URL template* | None (cache only) |
    /// | `TILECACHE_USER_AGENT` | `User-Agent` header* | `tilecache/<version>` |
    /// | `TILECACHE_TIMEOUT_SECS` | Request timeout* | 30 |
    /// | `TILECACHE_FRESHNESS_HOURS` | Age after which tiles are refreshed | 168 |
    /// | `TILECACHE_MEMORY_CACHE_MB` | In-memory cache budget | 32 |
    /// | `TILECACHE_PROBE_URL` | URL probed to detect connectivity* | None |
    ///
    /// *Only used when `download` feature is enabled.
    ///
    /// # Example
    ///
    /// ```bash
    /// export TILECACHE_DIR=/var/cache/tiles
    /// export TILECACHE_URL_TEMPLATE="https://tile.example.org/{z}/{x}/{y}.png"
    /// export TILECACHE_FRESHNESS_HOURS=24
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if `TILECACHE_DIR` is not set.
    pub fn from_env() -> Result<Self> {
        let cache_dir = std::env::var("TILECACHE_DIR").map_err(|_| {
            TileCacheError::InvalidConfig("TILECACHE_DIR environment variable not set".to_string())
        })?;

        let mut builder = Self::new(cache_dir);
        builder.url_template = env_string("TILECACHE_URL_TEMPLATE");
        builder.user_agent = env_string("TILECACHE_USER_AGENT");
        builder.probe_url = env_string("TILECACHE_PROBE_URL");

        if let Some(secs) = env_parse::<u64>("TILECACHE_TIMEOUT_SECS") {
            builder.timeout_secs = secs;
        }
        if let Some(hours) = env_parse::<u64>("TILECACHE_FRESHNESS_HOURS") {
            builder.freshness = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(mb) = env_parse::<u64>("TILECACHE_MEMORY_CACHE_MB") {
            builder.memory_cache_bytes = mb * 1024 * 1024;
        }

        Ok(builder)
    }

    /// Set the cache directory.
    ///
    /// Overrides the directory set in the constructor or from environment.
    pub fn cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Download missing and stale tiles from this URL template.
    ///
    /// Requires the `download` feature at build time.
    pub fn url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = Some(template.into());
        self
    }

    /// Set the `User-Agent` header sent to the tile server.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the request timeout in seconds.
    ///
    /// Default is 30 seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the age after which cached tiles are refreshed.
    ///
    /// Default is seven days.
    pub fn freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Set the in-memory cache budget in bytes. Zero disables it.
    pub fn memory_cache_bytes(mut self, bytes: u64) -> Self {
        self.memory_cache_bytes = bytes;
        self
    }

    /// Check connectivity with a HEAD request to this URL before downloading.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Never touch the network; serve cached tiles only.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Use a custom tile source instead of the HTTP one.
    pub fn source(mut self, source: Arc<dyn TileSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use a custom connectivity check.
    pub fn reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = Some(reachability);
        self
    }

    /// Build the [`TileService`].
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::DirectoryError`] - the cache directory cannot be created
    /// - [`TileCacheError::InvalidConfig`] - unusable URL template, or a template
    ///   given without the `download` feature
    pub fn build(self) -> Result<TileService> {
        let store = Arc::new(TileStore::new(
            TileStoreConfig::new(&self.cache_dir)
                .with_freshness(self.freshness)
                .with_memory_cache_bytes(self.memory_cache_bytes),
        )?);

        let source = match (self.source.clone(), self.url_template.as_deref()) {
            (Some(source), _) => Some(source),
            (None, Some(template)) => Some(self.http_source(template)?),
            (None, None) => None,
        };
        let has_network_source = source.is_some();

        let reachability: Arc<dyn Reachability> = if self.offline || !has_network_source {
            Arc::new(AlwaysOffline)
        } else if let Some(reachability) = self.reachability.clone() {
            reachability
        } else if let Some(url) = self.probe_url.as_deref() {
            self.http_probe(url)?
        } else {
            Arc::new(AlwaysOnline)
        };

        tracing::debug!(
            cache_dir = %self.cache_dir.display(),
            network = has_network_source && !self.offline,
            "Tile service configured"
        );

        let source = source.unwrap_or_else(|| Arc::new(NoSource));
        let fetcher = TileFetcher::new(store.clone(), source, reachability);

        Ok(TileService {
            store,
            fetcher,
            has_network_source,
        })
    }

    #[cfg(feature = "download")]
    fn http_source(&self, template: &str) -> Result<Arc<dyn TileSource>> {
        let mut config = HttpSourceConfig::with_url_template(template).with_timeout(self.timeout_secs);
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        Ok(Arc::new(HttpTileSource::new(config)?))
    }

    #[cfg(not(feature = "download"))]
    fn http_source(&self, _template: &str) -> Result<Arc<dyn TileSource>> {
        Err(TileCacheError::InvalidConfig(
            "a tile URL template requires the `download` feature".to_string(),
        ))
    }

    #[cfg(feature = "download")]
    fn http_probe(&self, url: &str) -> Result<Arc<dyn Reachability>> {
        Ok(Arc::new(HttpProbe::new(url)?))
    }

    #[cfg(not(feature = "download"))]
    fn http_probe(&self, _url: &str) -> Result<Arc<dyn Reachability>> {
        Err(TileCacheError::InvalidConfig(
            "a probe URL requires the `download` feature".to_string(),
        ))
    }
}

/// A non-empty environment variable.
fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
