//! Chunked, cached access to remote 3D scalar volumes, dense tensor operators and isosurface
//! extraction.

pub mod addressing;
mod cache;
mod config;
mod dense;
mod error;
mod extent;
mod indexer;
mod lru_cache;
mod marching_cubes;
mod marching_cubes_tables;
mod mesh;
mod metadata;
mod point;
mod region;
mod source;

#[cfg(feature = "image")]
mod image;

#[cfg(test)]
mod test_util;

pub use cache::{DiskCache, RawChunk, SharedChunk, TieredCache};
pub use config::{CacheConfig, DatasetConfig, DEFAULT_CACHE_CAPACITY};
pub use dense::{DenseSlice, DenseVolume};
pub use error::{
    AssemblerError, ChunkLengthError, CodecError, ConfigError, DiskIoFailure, FetchError, MeshError, MetadataError,
    TransportError, VolumeError,
};
pub use extent::{Extent, ExtentIterator};
pub use indexer::{Indexer, ZyxIndexer};
pub use lru_cache::LruCache;
pub use marching_cubes::extract as extract_isosurface;
pub use mesh::Mesh;
pub use metadata::{ArrayMetadata, CodecParams, Dtype, MemoryOrder, Shuffle};
pub use point::{ChunkCoord, LocalOffset, Point};
pub use region::{RegionAssembler, RegionOfInterest};
pub use source::{ChunkSource, Decompress, FileTransport, Lz4Codec, RawCodec, Transport};

pub mod prelude {
    pub use crate::{
        extract_isosurface, ArrayMetadata, CacheConfig, ChunkSource, DatasetConfig, DenseSlice,
        DenseVolume, Dtype, Mesh, RegionAssembler, RegionOfInterest, TieredCache,
    };
}
