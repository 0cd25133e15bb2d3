use anyhow::{Context, Result};
use lru::LruCache;
use metrics::counter;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Number of tiles kept in memory. A 1-arcsecond tile is ~25 MB, so this
/// bounds the cache at roughly 250 MB.
const TILE_CACHE_CAPACITY: usize = 10;

use crate::hgt::HgtTile;

/// Memoizing store for SRTM tiles, keyed by the integer south-west corner.
///
/// Loads go through a bounded LRU cache behind a single mutex; the tile
/// payloads are immutable after insertion and shared as `Arc`, so concurrent
/// searches only contend on the get-or-load critical section.
#[derive(Clone)]
pub struct TileStore {
    data_dir: PathBuf,
    cache: Arc<Mutex<LruCache<(i32, i32), Arc<HgtTile>>>>,
}

impl TileStore {
    /// Create a store rooted at `TERRAIN_DATA_PATH`, defaulting to `./data`.
    pub fn new() -> Self {
        let data_dir =
            std::env::var("TERRAIN_DATA_PATH").unwrap_or_else(|_| "./data".to_string());
        Self::with_dir(PathBuf::from(data_dir))
    }

    pub fn with_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(TILE_CACHE_CAPACITY).unwrap(),
            ))),
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Get the tile whose south-west corner is `(lat, lon)`, loading it from
    /// disk on a cache miss. A missing or malformed tile file is a hard
    /// error.
    pub fn load(&self, lat: i32, lon: i32) -> Result<Arc<HgtTile>> {
        let mut cache = self.cache.lock().expect("tile cache mutex poisoned");

        if let Some(tile) = cache.get(&(lat, lon)) {
            counter!("terrain.tile_cache.hits").increment(1);
            return Ok(tile.clone());
        }
        counter!("terrain.tile_cache.misses").increment(1);

        let path = self.data_dir.join(HgtTile::file_name(lat, lon));
        info!("Loading tile {}", path.display());

        let tile = Arc::new(
            HgtTile::from_file(&path, (lat, lon))
                .with_context(|| format!("failed to load tile for ({}, {})", lat, lon))?,
        );
        counter!("terrain.tile_cache.loads").increment(1);

        cache.put((lat, lon), tile.clone());
        Ok(tile)
    }
}

impl Default for TileStore {
    fn default() -> Self {
        Self::new()
    }
}
