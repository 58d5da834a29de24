//! Persistent tile store.
//!
//! [`TileStore`] keeps one file per tile under a single cache root:
//!
//! ```text
//! <cache_dir>/<zoom>_<x>_<y>.png
//! ```
//!
//! Tiles are never evicted. A tile older than the freshness window is
//! *stale*: it stays on disk and is still served when the network cannot
//! provide a newer copy. Only [`TileStore::clear`] removes tiles.
//!
//! Recently read tiles are also kept in a small in-memory cache bounded by
//! total byte size. Existence and freshness are always decided from the file
//! on disk, and a memory entry is only served while the file still has the
//! modification time and length it had when the entry was made. Several
//! stores (or processes) can therefore share one cache directory.

use std::fs::{self, File, Metadata};
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use moka::sync::Cache;

use crate::error::{Result, TileCacheError};
use crate::tile::TileId;

/// Default freshness window: seven days.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default byte budget of the in-memory layer.
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 32 * 1024 * 1024;

/// File extension of cached tiles.
pub const TILE_EXTENSION: &str = "png";

/// Suffix of in-progress writes. Never a valid tile file.
const TEMP_EXTENSION: &str = "tmp";

/// Distinguishes temporary files of concurrent writers.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Configuration for a [`TileStore`].
#[derive(Debug, Clone)]
pub struct TileStoreConfig {
    /// Root directory holding the tile files.
    pub cache_dir: PathBuf,
    /// Age after which a cached tile is considered stale.
    pub freshness: Duration,
    /// Byte budget of the in-memory layer. Zero disables it.
    pub memory_cache_bytes: u64,
}

impl TileStoreConfig {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            freshness: DEFAULT_FRESHNESS,
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
        }
    }

    /// Set the freshness window.
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Set the in-memory byte budget.
    pub fn with_memory_cache_bytes(mut self, bytes: u64) -> Self {
        self.memory_cache_bytes = bytes;
        self
    }
}

/// Tile bytes held in memory, tagged with the file they were read from.
#[derive(Clone)]
struct MemoryEntry {
    modified: SystemTime,
    len: u64,
    bytes: Arc<Vec<u8>>,
}

impl MemoryEntry {
    fn new(metadata: &Metadata, bytes: Vec<u8>) -> Option<Self> {
        Some(Self {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
            bytes: Arc::new(bytes),
        })
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        metadata.len() == self.len && metadata.modified().ok() == Some(self.modified)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of tiles currently held in memory.
    pub entry_count: u64,
    /// Reads served from memory.
    pub hit_count: u64,
    /// Reads that went to disk.
    pub miss_count: u64,
    /// Tiles present on disk.
    pub disk_tiles: u64,
    /// Total size of the tiles on disk, in bytes.
    pub disk_bytes: u64,
}

impl CacheStats {
    /// Calculate the in-memory hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// On-disk tile cache keyed by [`TileId`].
///
/// All methods take `&self`; the store can be shared across threads. Writes
/// go to a temporary file that is renamed into place, so readers never see a
/// partially written tile.
///
/// # Example
///
/// ```ignore
/// use tilecache::{TileId, TileStore, TileStoreConfig};
///
/// let store = TileStore::new(TileStoreConfig::new("/var/cache/tiles"))?;
/// let tile = TileId::new(12, 2200, 1343)?;
///
/// store.write(tile, &png_bytes)?;
/// assert!(store.is_fresh(tile));
/// ```
pub struct TileStore {
    config: TileStoreConfig,
    /// Bytes of recently read or written tiles.
    memory: Cache<TileId, MemoryEntry>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl TileStore {
    /// Open a store, creating the cache directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TileCacheError::DirectoryError`] if the directory cannot be
    /// created.
    pub fn new(config: TileStoreConfig) -> Result<Self> {
        let memory = Cache::builder()
            .weigher(|_tile: &TileId, entry: &MemoryEntry| {
                u32::try_from(entry.bytes.len()).unwrap_or(u32::MAX)
            })
            .max_capacity(config.memory_cache_bytes)
            .build();

        let store = Self {
            config,
            memory,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        };
        store.ensure_cache_directory()?;

        Ok(store)
    }

    /// The cache root directory.
    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// The freshness window.
    pub fn freshness(&self) -> Duration {
        self.config.freshness
    }

    /// Path of the file backing a tile.
    pub fn path_for(&self, tile: TileId) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{}.{}", tile.cache_key(), TILE_EXTENSION))
    }

    /// Create the cache directory if it is missing.
    ///
    /// Safe to call concurrently: a directory created by another caller in
    /// the meantime is not an error.
    pub fn ensure_cache_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.config.cache_dir).map_err(|source| {
            TileCacheError::DirectoryError {
                path: self.config.cache_dir.clone(),
                source,
            }
        })
    }

    /// Whether a tile is present on disk, fresh or not.
    ///
    /// A tile whose metadata cannot be read for any reason other than its
    /// absence counts as present.
    pub fn exists(&self, tile: TileId) -> bool {
        match fs::metadata(self.path_for(tile)) {
            Ok(metadata) => metadata.is_file(),
            Err(e) => !is_absent(&e),
        }
    }

    /// Modification time of the cached tile.
    ///
    /// # Errors
    ///
    /// Returns [`TileCacheError::NotFound`] if the tile is not cached.
    pub fn last_write_time(&self, tile: TileId) -> Result<SystemTime> {
        let metadata = fs::metadata(self.path_for(tile)).map_err(|e| not_found_or(tile, e))?;
        Ok(metadata.modified()?)
    }

    /// Time elapsed since the tile was written.
    ///
    /// A modification time in the future counts as zero age.
    pub fn age(&self, tile: TileId) -> Result<Duration> {
        let written = self.last_write_time(tile)?;
        Ok(SystemTime::now()
            .duration_since(written)
            .unwrap_or(Duration::ZERO))
    }

    /// Whether the tile exists and is younger than the freshness window.
    ///
    /// If the tile exists but its metadata cannot be read, it is reported as
    /// fresh so that it keeps being served.
    pub fn is_fresh(&self, tile: TileId) -> bool {
        let modified = match fs::metadata(self.path_for(tile)) {
            Ok(metadata) if !metadata.is_file() => return false,
            Ok(metadata) => metadata.modified(),
            Err(e) if is_absent(&e) => return false,
            Err(e) => Err(e),
        };

        self.fresh_at(tile, modified, SystemTime::now())
    }

    /// Freshness of an existing tile given the result of reading its
    /// modification time.
    fn fresh_at(&self, tile: TileId, modified: io::Result<SystemTime>, now: SystemTime) -> bool {
        match modified {
            Ok(written) => {
                now.duration_since(written).unwrap_or(Duration::ZERO) < self.config.freshness
            }
            Err(e) => {
                tracing::warn!(tile = %tile, error = %e, "Unreadable tile metadata, treating as fresh");
                true
            }
        }
    }

    /// Read a cached tile.
    ///
    /// # Errors
    ///
    /// Returns [`TileCacheError::NotFound`] if the tile is not cached.
    pub fn read(&self, tile: TileId) -> Result<Vec<u8>> {
        let path = self.path_for(tile);

        if let Some(entry) = self.memory.get(&tile) {
            match fs::metadata(&path) {
                Ok(metadata) if entry.matches(&metadata) => {
                    self.hit_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.bytes.as_ref().clone());
                }
                // Rewritten or removed since the entry was made
                _ => self.memory.invalidate(&tile),
            }
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);

        // Metadata and bytes come from the same open file, so a concurrent
        // rename cannot pair one file's bytes with another's mtime.
        let mut file = File::open(&path).map_err(|e| not_found_or(tile, e))?;
        let metadata = file.metadata()?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut bytes)?;

        if let Some(entry) = MemoryEntry::new(&metadata, bytes.clone()) {
            self.memory.insert(tile, entry);
        }

        Ok(bytes)
    }

    /// Store a tile, replacing any previous copy.
    pub fn write(&self, tile: TileId, bytes: &[u8]) -> Result<()> {
        self.ensure_cache_directory()?;

        let path = self.path_for(tile);
        let temp_path = self.config.cache_dir.join(format!(
            ".{}.{}.{}",
            tile.cache_key(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_EXTENSION
        ));

        // Renaming keeps the modification time, so the temp file's metadata
        // describes the tile file.
        let written = fs::write(&temp_path, bytes)
            .and_then(|()| fs::metadata(&temp_path))
            .and_then(|metadata| fs::rename(&temp_path, &path).map(|()| metadata));
        let metadata = match written {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                self.memory.invalidate(&tile);
                return Err(e.into());
            }
        };

        match MemoryEntry::new(&metadata, bytes.to_vec()) {
            Some(entry) => self.memory.insert(tile, entry),
            None => self.memory.invalidate(&tile),
        }
        tracing::trace!(tile = %tile, bytes = bytes.len(), "Tile written");

        Ok(())
    }

    /// Delete every cached tile and recreate the empty cache directory.
    pub fn clear(&self) -> Result<()> {
        self.memory.invalidate_all();

        match fs::remove_dir_all(&self.config.cache_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TileCacheError::DirectoryError {
                    path: self.config.cache_dir.clone(),
                    source,
                })
            }
        }

        self.ensure_cache_directory()
    }

    /// Scan the cache directory for tile files.
    ///
    /// Returns a sorted list of tiles. Files that are not valid tiles
    /// (temporary files, foreign files) are skipped.
    pub fn list_tiles(&self) -> Vec<TileId> {
        let mut tiles: Vec<TileId> = self
            .tile_files()
            .into_iter()
            .map(|(tile, _)| tile)
            .collect();
        tiles.sort();
        tiles
    }

    /// Total size of all cached tiles, in bytes.
    pub fn disk_usage(&self) -> u64 {
        self.tile_files().into_iter().map(|(_, size)| size).sum()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let files = self.tile_files();

        CacheStats {
            entry_count: self.memory.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            disk_tiles: files.len() as u64,
            disk_bytes: files.iter().map(|(_, size)| size).sum(),
        }
    }

    /// Tile files in the cache directory with their sizes.
    fn tile_files(&self) -> Vec<(TileId, u64)> {
        let entries = match fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().map(|e| e != TILE_EXTENSION).unwrap_or(true) {
                    return None;
                }
                let tile = TileId::from_key(&entry.file_name().to_string_lossy())?;
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                Some((tile, size))
            })
            .collect()
    }
}

/// Whether a metadata error means there is no file at the path.
fn is_absent(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn not_found_or(tile: TileId, e: io::Error) -> TileCacheError {
    if is_absent(&e) {
        TileCacheError::NotFound { tile }
    } else {
        TileCacheError::Io(e)
    }
}
