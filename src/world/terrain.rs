use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::world::map::{SECTOR_FACTOR, SECTOR_WIDTH};

/// Broad classification of a ground tile, used by movement and spawn
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Water,
    Rock,
    Grass,
    Lava,
    Dirt,
    Other,
}

/// Tile-id to kind mapping for one map plane. Anything unlisted is
/// `Other`.
#[derive(Debug, Default, Clone)]
pub struct TileTables {
    kinds: HashMap<u16, TileKind>,
}

impl TileTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tile_id: u16, kind: TileKind) {
        self.kinds.insert(tile_id, kind);
    }

    pub fn set_range(&mut self, first: u16, last: u16, kind: TileKind) {
        for tile_id in first..=last {
            self.kinds.insert(tile_id, kind);
        }
    }

    pub fn classify(&self, tile_id: u16) -> TileKind {
        self.kinds.get(&tile_id).copied().unwrap_or(TileKind::Other)
    }
}

/// One ground tile of the immutable terrain layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainTile {
    pub id: u16,
    pub z: i8,
}

/// A static decoration item baked into the terrain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticItem {
    pub piece: u16,
    pub x: i32,
    pub y: i32,
    pub z: i8,
    pub color: u16,
}

/// Immutable terrain data for one sector: a full tile grid plus the
/// static items standing on it.
#[derive(Debug, Clone)]
pub struct TerrainSector {
    pub tiles: Vec<TerrainTile>,
    pub statics: Vec<StaticItem>,
}

impl TerrainSector {
    pub fn empty() -> Self {
        Self {
            tiles: vec![TerrainTile { id: 0, z: 0 }; (SECTOR_WIDTH * SECTOR_WIDTH) as usize],
            statics: Vec::new(),
        }
    }

    pub fn tile(&self, rel_x: usize, rel_y: usize) -> TerrainTile {
        self.tiles[rel_y * SECTOR_WIDTH as usize + rel_x]
    }
}

/// Supplier of terrain sectors; the cache pulls from it on every miss.
pub trait TerrainSource {
    fn sector(&self, plane: u8, sector_x: usize, sector_y: usize) -> TerrainSector;
}

/// Source with no terrain at all; every sector is flat and empty.
pub struct EmptyTerrain;

impl TerrainSource for EmptyTerrain {
    fn sector(&self, _plane: u8, _sector_x: usize, _sector_y: usize) -> TerrainSector {
        TerrainSector::empty()
    }
}

/// Cache entry with access tracking
#[derive(Clone)]
pub struct CachedTerrain {
    pub data: Arc<TerrainSector>,
    pub access_count: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub loads: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64)
        }
    }
}

/// Per-plane terrain cache with LRU eviction. Sectors load lazily on
/// first touch and stay shared behind `Arc` so query results remain
/// usable after an eviction.
pub struct TerrainCache {
    plane: u8,
    cache: LruCache<(usize, usize), CachedTerrain>,
    source: Box<dyn TerrainSource>,
    stats: CacheStats,
}

impl TerrainCache {
    pub fn new(plane: u8, capacity: usize, source: Box<dyn TerrainSource>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        TerrainCache {
            plane,
            cache: LruCache::new(capacity),
            source,
            stats: CacheStats::default(),
        }
    }

    /// Get a sector, pulling it from the source if not cached
    pub fn sector(&mut self, sector_x: usize, sector_y: usize) -> Arc<TerrainSector> {
        let key = (sector_x, sector_y);
        if let Some(cached) = self.cache.get_mut(&key) {
            cached.access_count += 1;
            self.stats.hits += 1;
            return Arc::clone(&cached.data);
        }

        self.stats.misses += 1;
        if self.cache.len() == self.cache.cap().get() {
            self.stats.evictions += 1;
        }
        let data = Arc::new(self.source.sector(self.plane, sector_x, sector_y));
        self.cache.put(
            key,
            CachedTerrain {
                data: Arc::clone(&data),
                access_count: 0,
            },
        );
        self.stats.loads += 1;
        data
    }

    /// Ground tile id at absolute coordinates
    pub fn tile_id(&mut self, x: i32, y: i32) -> u16 {
        self.tile(x, y).id
    }

    /// Ground elevation at absolute coordinates
    pub fn tile_z(&mut self, x: i32, y: i32) -> i8 {
        self.tile(x, y).z
    }

    fn tile(&mut self, x: i32, y: i32) -> TerrainTile {
        let sector = self.sector((x >> SECTOR_FACTOR) as usize, (y >> SECTOR_FACTOR) as usize);
        let rel_x = (x & (SECTOR_WIDTH - 1)) as usize;
        let rel_y = (y & (SECTOR_WIDTH - 1)) as usize;
        sector.tile(rel_x, rel_y)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
