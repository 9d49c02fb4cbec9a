use crate::{
    lru_cache::LruCache, CacheConfig, ChunkCoord, ChunkLengthError, ConfigError, DiskIoFailure,
};

use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decompressed samples of exactly one chunk, row-major with `z` outermost and `x` innermost.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawChunk {
    bytes: Vec<u8>,
}

impl RawChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        RawChunk { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A chunk handed out by the cache. The buffer is shared with the cache and stays valid for as
/// long as the handle is held, even if the cache evicts its own reference.
pub type SharedChunk = Arc<RawChunk>;

/// Persists decompressed chunks under `root`, mirroring the remote layout `{z}/{y}/{x}`.
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Creates `root` (and its parents) if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        if !root.is_dir() {
            info!("Creating disk cache root {:?}", root);
        }
        fs::create_dir_all(&root).map_err(|source| ConfigError::DiskRoot {
            path: root.clone(),
            source,
        })?;

        Ok(DiskCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, coord: &ChunkCoord) -> PathBuf {
        self.root
            .join(coord.z.to_string())
            .join(coord.y.to_string())
            .join(coord.x.to_string())
    }

    /// `Ok(None)` when the chunk was never written. An entry whose length differs from
    /// `expected_len` is reported as truncated.
    pub fn get(
        &self,
        coord: &ChunkCoord,
        expected_len: usize,
    ) -> Result<Option<RawChunk>, DiskIoFailure> {
        let path = self.path_for(coord);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DiskIoFailure::Io { path, source }),
        };
        if bytes.len() != expected_len {
            return Err(DiskIoFailure::Truncated {
                path,
                expected: expected_len,
                actual: bytes.len(),
            });
        }

        Ok(Some(RawChunk::new(bytes)))
    }

    /// Writes through a temporary file so a crashed write never leaves a short entry behind.
    pub fn put(&self, coord: &ChunkCoord, chunk: &RawChunk) -> Result<(), DiskIoFailure> {
        let path = self.path_for(coord);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DiskIoFailure::Io { path, source }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = path.with_extension("partial");
        fs::write(&tmp, chunk.as_bytes()).map_err(io_err(&tmp))?;
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(DiskIoFailure::Io { path, source });
        }

        Ok(())
    }

    pub fn remove(&self, coord: &ChunkCoord) -> Result<(), DiskIoFailure> {
        let path = self.path_for(coord);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DiskIoFailure::Io { path, source }),
        }
    }
}

/// A capacity-bounded, recency-ordered cache of decompressed chunks: memory first, then an
/// optional disk mirror.
///
/// Not synchronized. One owner drives a cache at a time; share it across threads only behind a
/// lock.
#[derive(Debug)]
pub struct TieredCache {
    memory: LruCache<ChunkCoord, SharedChunk>,
    disk: Option<DiskCache>,
    chunk_byte_len: usize,
}

impl TieredCache {
    /// `chunk_byte_len` is the decompressed size of every chunk; disk entries of any other size
    /// are ignored.
    pub fn new(config: &CacheConfig, chunk_byte_len: usize) -> Result<Self, ConfigError> {
        if config.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let disk = config.disk_root.as_ref().map(DiskCache::new).transpose()?;
        info!(
            "Chunk cache: {} chunks in memory, disk tier {:?}",
            config.capacity,
            disk.as_ref().map(DiskCache::root)
        );

        Ok(TieredCache {
            memory: LruCache::new(config.capacity),
            disk,
            chunk_byte_len,
        })
    }

    /// Looks in memory, then on disk. A hit in either tier makes the chunk the most recently
    /// used; a disk hit is promoted into memory. Disk read failures count as misses.
    pub fn get(&mut self, coord: &ChunkCoord) -> Option<SharedChunk> {
        if let Some(chunk) = self.get_memory(coord) {
            return Some(chunk);
        }

        let chunk = Arc::new(self.disk_get(coord)?);
        debug!("Disk cache hit for chunk {}", coord);
        // `disk_get` only returns entries of the right length.
        self.insert_memory(*coord, Arc::clone(&chunk));

        Some(chunk)
    }

    /// Memory tier only.
    pub fn get_memory(&mut self, coord: &ChunkCoord) -> Option<SharedChunk> {
        let hit = self.memory.get(coord).map(Arc::clone);
        if hit.is_some() {
            debug!("Memory cache hit for chunk {}", coord);
        }

        hit
    }

    /// Stores `chunk` in both tiers as the most recently used entry and returns the shared handle.
    /// Chunks of the wrong length are refused and neither tier changes.
    pub fn put(
        &mut self,
        coord: ChunkCoord,
        chunk: RawChunk,
    ) -> Result<SharedChunk, ChunkLengthError> {
        self.check_len(&coord, &chunk)?;
        self.disk_put(&coord, &chunk);
        let chunk = Arc::new(chunk);
        self.insert_memory(coord, Arc::clone(&chunk));

        Ok(chunk)
    }

    /// Memory tier only. Evicts the least recently used chunk first when at capacity.
    pub fn put_memory(
        &mut self,
        coord: ChunkCoord,
        chunk: SharedChunk,
    ) -> Result<(), ChunkLengthError> {
        self.check_len(&coord, &chunk)?;
        self.insert_memory(coord, chunk);

        Ok(())
    }

    fn insert_memory(&mut self, coord: ChunkCoord, chunk: SharedChunk) {
        if let Some((evicted, _)) = self.memory.insert(coord, chunk) {
            debug!("Evicted chunk {} from memory", evicted);
        }
    }

    fn check_len(&self, coord: &ChunkCoord, chunk: &RawChunk) -> Result<(), ChunkLengthError> {
        if chunk.len() != self.chunk_byte_len {
            return Err(ChunkLengthError {
                coord: *coord,
                expected: self.chunk_byte_len,
                actual: chunk.len(),
            });
        }

        Ok(())
    }

    /// Reads the disk tier. Missing entries and I/O errors are both misses.
    pub fn disk_get(&self, coord: &ChunkCoord) -> Option<RawChunk> {
        let disk = self.disk.as_ref()?;
        match disk.get(coord, self.chunk_byte_len) {
            Ok(found) => found,
            Err(e) => {
                warn!("{}; treating as a cache miss", e);
                None
            }
        }
    }

    /// Writes the disk tier. Failures are logged and otherwise ignored.
    pub fn disk_put(&self, coord: &ChunkCoord, chunk: &RawChunk) {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(coord, chunk) {
                warn!("{}; chunk {} stays memory-only", e, coord);
            }
        }
    }

    pub fn contains(&self, coord: &ChunkCoord) -> bool {
        self.memory.contains(coord)
    }

    /// Drops a chunk from memory and disk.
    pub fn remove(&mut self, coord: &ChunkCoord) -> Option<SharedChunk> {
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(coord) {
                warn!("{}", e);
            }
        }

        self.memory.remove(coord)
    }

    pub fn evict_lru(&mut self) -> Option<(ChunkCoord, SharedChunk)> {
        self.memory.evict_lru()
    }

    /// Empties the memory tier. The disk tier is left untouched.
    pub fn clear(&mut self) {
        self.memory.clear();
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }

    pub fn chunk_byte_len(&self) -> usize {
        self.chunk_byte_len
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    /// Chunk coordinates from most to least recently used.
    pub fn resident(&self) -> impl Iterator<Item = &ChunkCoord> {
        self.memory.keys_by_recency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn chunk(tag: u8) -> RawChunk {
        RawChunk::new(vec![tag; 8])
    }

    fn key(i: i32) -> ChunkCoord {
        Point::new(i, 0, 0)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            TieredCache::new(&CacheConfig::memory_only(0), 8),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn repeated_gets_are_identical() {
        let mut cache = TieredCache::new(&CacheConfig::memory_only(2), 8).unwrap();
        cache.put(key(0), chunk(3)).unwrap();

        let a = cache.get(&key(0)).unwrap();
        let b = cache.get(&key(0)).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn untouched_first_chunk_is_evicted() {
        let mut cache = TieredCache::new(&CacheConfig::memory_only(3), 8).unwrap();
        for i in 0..4 {
            cache.put(key(i), chunk(i as u8)).unwrap();
        }

        assert!(cache.get(&key(0)).is_none());
        for i in 1..4 {
            assert!(cache.contains(&key(i)));
        }
    }

    #[test]
    fn touched_first_chunk_survives() {
        let mut cache = TieredCache::new(&CacheConfig::memory_only(3), 8).unwrap();
        for i in 0..3 {
            cache.put(key(i), chunk(i as u8)).unwrap();
        }
        cache.get(&key(0));
        cache.put(key(3), chunk(3)).unwrap();

        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn evicted_handles_stay_valid() {
        let mut cache = TieredCache::new(&CacheConfig::memory_only(1), 8).unwrap();
        let held = cache.put(key(0), chunk(7)).unwrap();
        cache.put(key(1), chunk(8)).unwrap();

        assert!(!cache.contains(&key(0)));
        assert_eq!(held.as_bytes(), &[7; 8]);
    }

    #[test]
    fn disk_hit_repopulates_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::memory_only(1).with_disk_root(dir.path());
        let mut cache = TieredCache::new(&config, 8).unwrap();

        cache.put(Point::new(1, 2, 3), chunk(5)).unwrap();
        cache.put(Point::new(4, 5, 6), chunk(6)).unwrap();
        assert!(!cache.contains(&Point::new(1, 2, 3)));
        assert!(dir.path().join("3").join("2").join("1").is_file());

        let found = cache.get(&Point::new(1, 2, 3)).unwrap();
        assert_eq!(found.as_bytes(), &[5; 8]);
        assert!(cache.contains(&Point::new(1, 2, 3)));
    }

    #[test]
    fn disk_tier_survives_a_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::memory_only(4).with_disk_root(dir.path());
        {
            let mut cache = TieredCache::new(&config, 8).unwrap();
            cache.put(key(9), chunk(9)).unwrap();
        }

        let mut cache = TieredCache::new(&config, 8).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&key(9)).unwrap().as_bytes(), &[9; 8]);
    }

    #[test]
    fn wrong_length_put_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::memory_only(2).with_disk_root(dir.path());
        let mut cache = TieredCache::new(&config, 8).unwrap();

        let err = cache.put(key(0), RawChunk::new(vec![1; 5])).unwrap_err();
        assert_eq!((err.expected, err.actual), (8, 5));
        assert!(cache
            .put_memory(key(1), Arc::new(RawChunk::new(vec![1; 9])))
            .is_err());

        assert!(cache.is_empty());
        assert!(!cache.disk().unwrap().path_for(&key(0)).exists());
    }

    #[test]
    fn failed_disk_write_keeps_chunk_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::memory_only(2).with_disk_root(dir.path());
        let mut cache = TieredCache::new(&config, 8).unwrap();
        // A plain file where the z directory should go.
        fs::write(dir.path().join("0"), b"x").unwrap();

        cache.put(key(4), chunk(4)).unwrap();

        assert_eq!(cache.get(&key(4)).unwrap().as_bytes(), &[4; 8]);
    }

    #[test]
    fn failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(dir.path()).unwrap();
        let target = disk.path_for(&key(0));
        fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(disk.put(&key(0), &chunk(1)).is_err());
        assert!(!target.with_extension("partial").exists());
    }

    #[test]
    fn short_disk_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::memory_only(4).with_disk_root(dir.path());
        let mut cache = TieredCache::new(&config, 8).unwrap();

        let disk = cache.disk().unwrap().clone();
        disk.put(&key(1), &RawChunk::new(vec![1; 3])).unwrap();

        assert!(cache.get(&key(1)).is_none());
    }
}
