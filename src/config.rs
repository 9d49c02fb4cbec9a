use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of decompressed chunks kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of chunks resident in the memory tier. Must be at least 1.
    pub capacity: usize,
    /// Root directory of the disk tier. `None` disables the disk tier.
    pub disk_root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: DEFAULT_CACHE_CAPACITY,
            disk_root: None,
        }
    }
}

impl CacheConfig {
    pub fn memory_only(capacity: usize) -> Self {
        CacheConfig {
            capacity,
            disk_root: None,
        }
    }

    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_root = Some(root.into());

        self
    }
}

/// Where a dataset lives and how its chunks are cached.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatasetConfig {
    /// Chunk `(z, y, x)` is fetched from `{base_url}/{z}/{y}/{x}`.
    pub base_url: String,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl DatasetConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        DatasetConfig {
            base_url: base_url.into(),
            cache: CacheConfig::default(),
        }
    }
}
