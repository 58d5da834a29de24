//! Region prefetching.
//!
//! A [`PrefetchJob`] names a region and a zoom range. [`RegionPrefetcher`]
//! expands it into tiles, keeps at most [`MAX_TILES`] of them and fetches
//! them in batches of [`BATCH_SIZE`] concurrent requests. A batch finishes
//! completely before the next one starts, so no more than [`BATCH_SIZE`]
//! requests are ever in flight.
//!
//! Failed tiles are logged and counted; they never abort the job. A cache
//! directory that cannot be created does, before any tile is requested.

use std::time::Instant;

use crate::coords::tiles_for_region;
use crate::error::{Result, TileCacheError};
use crate::fetcher::{FetchedTile, TileFetcher, TileOrigin};
use crate::tile::{Region, TileId, MAX_ZOOM};

/// Maximum number of tiles fetched by one prefetch call.
pub const MAX_TILES: usize = 200;

/// Number of tiles fetched concurrently.
pub const BATCH_SIZE: usize = 10;

/// A region and zoom range to warm the cache for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefetchJob {
    pub region: Region,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl PrefetchJob {
    /// Create a job.
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::InvalidRegion`] - non-positive or NaN span, or a
    ///   center off the globe
    /// - [`TileCacheError::InvalidZoomRange`] - `min_zoom > max_zoom` or
    ///   `max_zoom` above [`MAX_ZOOM`]
    pub fn new(region: Region, min_zoom: u8, max_zoom: u8) -> Result<Self> {
        if !region.is_valid() {
            return Err(TileCacheError::InvalidRegion { region });
        }
        if min_zoom > max_zoom || max_zoom > MAX_ZOOM {
            return Err(TileCacheError::InvalidZoomRange { min_zoom, max_zoom });
        }

        Ok(Self {
            region,
            min_zoom,
            max_zoom,
        })
    }

    /// Every tile covering the job, before the cap is applied.
    pub fn tiles(&self) -> Vec<TileId> {
        tiles_for_region(&self.region, self.min_zoom, self.max_zoom)
    }
}

/// Outcome of a prefetch call.
#[derive(Debug, Clone, Default)]
pub struct PrefetchReport {
    /// Tiles covering the job before the cap.
    pub requested: usize,
    /// Tiles a fetch was attempted for.
    pub attempted: usize,
    /// Tiles that ended up in the cache, from any tier.
    pub succeeded: usize,
    /// Tiles that could not be obtained.
    pub failed: usize,
    /// Tiles already fresh in the cache.
    pub already_fresh: usize,
    /// Tiles downloaded and cached during this call.
    pub downloaded: usize,
    /// Tiles downloaded but not written to the cache.
    pub uncached: usize,
    /// Tiles only available as a stale copy.
    pub stale: usize,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// The tiles that failed, in fetch order.
    pub failed_tiles: Vec<TileId>,
}

impl PrefetchReport {
    /// Whether the tile list was cut to [`MAX_TILES`].
    pub fn truncated(&self) -> bool {
        self.requested > self.attempted
    }

    fn record(&mut self, tile: TileId, result: Result<FetchedTile>) {
        match result {
            Ok(fetched) if !fetched.cached => self.uncached += 1,
            Ok(fetched) => {
                self.succeeded += 1;
                match fetched.origin {
                    TileOrigin::FreshCache => self.already_fresh += 1,
                    TileOrigin::Network => self.downloaded += 1,
                    TileOrigin::StaleCache => self.stale += 1,
                }
            }
            Err(e) => {
                tracing::warn!(tile = %tile, error = %e, "Prefetch failed for tile");
                self.failed += 1;
                self.failed_tiles.push(tile);
            }
        }
    }
}

/// Drives a [`TileFetcher`] over the tiles of a region.
///
/// # Example
///
/// ```ignore
/// use tilecache::{GeoPoint, PrefetchJob, Region, RegionPrefetcher};
///
/// let region = Region::new(GeoPoint::new(40.7128, -74.0060), 0.05, 0.05);
/// let job = PrefetchJob::new(region, 12, 15)?;
///
/// let report = RegionPrefetcher::new(&fetcher).prefetch_detailed(&job)?;
/// println!("{} of {} tiles available", report.succeeded, report.attempted);
/// ```
pub struct RegionPrefetcher<'a> {
    fetcher: &'a TileFetcher,
}

impl<'a> RegionPrefetcher<'a> {
    pub fn new(fetcher: &'a TileFetcher) -> Self {
        Self { fetcher }
    }

    /// Prefetch a job and return the number of tiles attempted.
    ///
    /// The count includes tiles that failed; use
    /// [`prefetch_detailed`](Self::prefetch_detailed) for the breakdown.
    ///
    /// # Errors
    ///
    /// Returns [`TileCacheError::DirectoryError`] if the cache directory
    /// cannot be created. Per-tile failures are never errors.
    pub fn prefetch(&self, job: &PrefetchJob) -> Result<usize> {
        Ok(self.prefetch_detailed(job)?.attempted)
    }

    /// Prefetch a job and report per-tier and per-tile outcomes.
    pub fn prefetch_detailed(&self, job: &PrefetchJob) -> Result<PrefetchReport> {
        self.prefetch_with_progress(job, |_, _| {})
    }

    /// Prefetch a job, calling `progress(completed, total)` after each batch.
    pub fn prefetch_with_progress<F>(
        &self,
        job: &PrefetchJob,
        mut progress: F,
    ) -> Result<PrefetchReport>
    where
        F: FnMut(usize, usize),
    {
        self.fetcher.store().ensure_cache_directory()?;

        let start = Instant::now();
        let mut tiles = job.tiles();
        let mut report = PrefetchReport {
            requested: tiles.len(),
            ..Default::default()
        };

        if tiles.len() > MAX_TILES {
            tracing::warn!(
                requested = tiles.len(),
                limit = MAX_TILES,
                "Region has too many tiles, prefetching only the first {}",
                MAX_TILES
            );
            tiles.truncate(MAX_TILES);
        }

        let total = tiles.len();
        for batch in tiles.chunks(BATCH_SIZE) {
            for (tile, result) in self.fetch_batch(batch) {
                report.record(tile, result);
            }
            report.attempted += batch.len();
            progress(report.attempted, total);
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            uncached = report.uncached,
            elapsed_ms = report.elapsed_ms,
            "Prefetch complete"
        );

        Ok(report)
    }

    /// Fetch every tile of a batch on its own thread and wait for all of them.
    fn fetch_batch(&self, batch: &[TileId]) -> Vec<(TileId, Result<FetchedTile>)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|&tile| (tile, scope.spawn(move || self.fetcher.fetch_with_origin(tile))))
                .collect();

            handles
                .into_iter()
                .map(|(tile, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(TileCacheError::FetchFailed {
                            tile,
                            reason: "fetch thread panicked".to_string(),
                        })
                    });
                    (tile, result)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::tile_to_point;
    use crate::source::{AlwaysOffline, TileSource};
    use crate::store::{TileStore, TileStoreConfig};
    use crate::testing::{MockReachability, MockSource};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Region whose edges coincide with a `cols` x `rows` block of tiles.
    fn block(zoom: u8, x: u32, y: u32, cols: u32, rows: u32) -> Region {
        let nw = tile_to_point(TileId { zoom, x, y });
        let se = tile_to_point(TileId {
            zoom,
            x: x + cols,
            y: y + rows,
        });
        Region::from_bounds(se.latitude, nw.longitude, nw.latitude, se.longitude)
    }

    fn job(region: Region, zoom: u8) -> PrefetchJob {
        PrefetchJob::new(region, zoom, zoom).unwrap()
    }

    fn fetcher(dir: &TempDir, source: Arc<MockSource>) -> TileFetcher {
        let store = Arc::new(TileStore::new(TileStoreConfig::new(dir.path())).unwrap());
        TileFetcher::new(store, source, Arc::new(MockReachability::new(true)))
    }

    #[test]
    fn test_job_rejects_bad_zoom_range() {
        let region = block(4, 0, 0, 1, 1);
        assert!(matches!(
            PrefetchJob::new(region, 5, 4),
            Err(TileCacheError::InvalidZoomRange {
                min_zoom: 5,
                max_zoom: 4
            })
        ));
        assert!(PrefetchJob::new(region, 0, MAX_ZOOM + 1).is_err());
        assert!(PrefetchJob::new(region, 0, MAX_ZOOM).is_ok());
    }

    #[test]
    fn test_job_rejects_invalid_region() {
        let center = tile_to_point(TileId { zoom: 4, x: 3, y: 3 });
        for (lat_span, lon_span) in [(-1.0, 1.0), (1.0, 0.0), (f64::NAN, 1.0)] {
            let region = Region::new(center, lat_span, lon_span);
            assert!(matches!(
                PrefetchJob::new(region, 4, 6),
                Err(TileCacheError::InvalidRegion { .. })
            ));
        }
    }

    #[test]
    fn test_cap_truncates_to_max_tiles() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png"));
        let fetcher = fetcher(&temp_dir, source.clone());
        let job = job(block(10, 500, 300, 40, 25), 10);
        assert_eq!(job.tiles().len(), 1000);

        let attempted = RegionPrefetcher::new(&fetcher).prefetch(&job).unwrap();

        assert_eq!(attempted, MAX_TILES);
        assert_eq!(source.calls(), MAX_TILES);
        // Truncation keeps the first tiles in computed order
        let expected: Vec<TileId> = job.tiles().into_iter().take(MAX_TILES).collect();
        assert_eq!(fetcher.store().list_tiles(), {
            let mut sorted = expected;
            sorted.sort();
            sorted
        });
    }

    #[test]
    fn test_small_region_is_fetched_entirely() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png"));
        let fetcher = fetcher(&temp_dir, source.clone());
        let job = job(block(12, 1000, 1000, 37, 1), 12);

        let report = RegionPrefetcher::new(&fetcher).prefetch_detailed(&job).unwrap();

        assert_eq!(report.requested, 37);
        assert_eq!(report.attempted, 37);
        assert_eq!(report.succeeded, 37);
        assert_eq!(report.downloaded, 37);
        assert!(!report.truncated());
        assert_eq!(source.calls(), 37);
    }

    #[test]
    fn test_batch_tolerates_failures() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png"));
        let job = job(block(8, 10, 10, 10, 1), 8);
        let tiles = job.tiles();
        for tile in [tiles[1], tiles[4], tiles[8]] {
            source.fail_tile(tile);
        }
        let fetcher = fetcher(&temp_dir, source.clone());

        let report = RegionPrefetcher::new(&fetcher).prefetch_detailed(&job).unwrap();

        assert_eq!(report.attempted, 10);
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 3);
        assert_eq!(report.failed_tiles, vec![tiles[1], tiles[4], tiles[8]]);
        assert_eq!(fetcher.store().list_tiles().len(), 7);
    }

    #[test]
    fn test_attempted_count_includes_failures() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::failing());
        let fetcher = fetcher(&temp_dir, source);
        let job = job(block(8, 10, 10, 5, 3), 8);

        assert_eq!(RegionPrefetcher::new(&fetcher).prefetch(&job).unwrap(), 15);
    }

    #[test]
    fn test_at_most_one_batch_in_flight() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png").with_delay(Duration::from_millis(20)));
        let fetcher = fetcher(&temp_dir, source.clone());
        let job = job(block(10, 0, 0, 7, 5), 10);

        RegionPrefetcher::new(&fetcher).prefetch(&job).unwrap();

        assert_eq!(source.calls(), 35);
        assert!(source.max_in_flight() <= BATCH_SIZE);
        assert!(source.max_in_flight() > 1);
    }

    #[test]
    fn test_progress_reported_per_batch() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher(&temp_dir, Arc::new(MockSource::new(b"png")));
        let job = job(block(9, 100, 100, 5, 5), 9);

        let mut updates = Vec::new();
        RegionPrefetcher::new(&fetcher)
            .prefetch_with_progress(&job, |done, total| updates.push((done, total)))
            .unwrap();

        assert_eq!(updates, vec![(10, 25), (20, 25), (25, 25)]);
    }

    #[test]
    fn test_second_pass_is_served_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png"));
        let fetcher = fetcher(&temp_dir, source.clone());
        let job = job(block(6, 3, 3, 4, 4), 6);
        let prefetcher = RegionPrefetcher::new(&fetcher);

        prefetcher.prefetch(&job).unwrap();
        let report = prefetcher.prefetch_detailed(&job).unwrap();

        assert_eq!(report.already_fresh, 16);
        assert_eq!(report.downloaded, 0);
        assert_eq!(source.calls(), 16);
    }

    #[test]
    fn test_offline_prefetch_completes() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(TileStore::new(TileStoreConfig::new(temp_dir.path())).unwrap());
        let source: Arc<dyn TileSource> = Arc::new(MockSource::new(b"png"));
        let fetcher = TileFetcher::new(store, source, Arc::new(AlwaysOffline));
        let job = job(block(5, 0, 0, 2, 2), 5);

        let report = RegionPrefetcher::new(&fetcher).prefetch_detailed(&job).unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.failed, 4);
    }

    #[test]
    fn test_unusable_cache_directory_aborts_prefetch() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("tiles");
        let store = Arc::new(TileStore::new(TileStoreConfig::new(&cache_dir)).unwrap());
        let source = Arc::new(MockSource::new(b"png"));
        let fetcher = TileFetcher::new(store, source.clone(), Arc::new(MockReachability::new(true)));

        // A plain file where the cache directory should be
        std::fs::remove_dir_all(&cache_dir).unwrap();
        std::fs::write(&cache_dir, b"blocker").unwrap();

        let result = RegionPrefetcher::new(&fetcher).prefetch(&job(block(2, 0, 0, 4, 4), 2));

        assert!(matches!(result, Err(TileCacheError::DirectoryError { .. })));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_downloads_that_cannot_be_cached_are_reported() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new(b"png"));
        let fetcher = fetcher(&temp_dir, source.clone());
        let job = job(block(7, 20, 20, 4, 1), 7);
        let tiles = job.tiles();

        // A non-empty directory at the tile path makes the cache write fail
        let blocked = fetcher.store().path_for(tiles[2]);
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("blocker"), b"").unwrap();

        let report = RegionPrefetcher::new(&fetcher).prefetch_detailed(&job).unwrap();

        assert_eq!(report.attempted, 4);
        assert_eq!(report.downloaded, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.uncached, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(source.calls(), 4);
    }
}
