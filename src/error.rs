use crate::{ChunkCoord, MemoryOrder, RegionOfInterest};

use std::path::PathBuf;
use thiserror::Error;

/// The network (or filesystem) collaborator could not deliver the bytes for `url`.
#[derive(Debug, Error)]
#[error("failed to fetch {url}: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, reason: impl ToString) -> Self {
        TransportError {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// The decompression collaborator rejected its input.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec rejected input: {0}")]
    Rejected(String),
    #[error("decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Failure to produce one chunk. Both variants are terminal for that fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure for chunk {coord} at {url}")]
    TransportFailure {
        coord: ChunkCoord,
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("decode failure for chunk {coord} at {url}")]
    DecodeFailure {
        coord: ChunkCoord,
        url: String,
        #[source]
        source: CodecError,
    },
}

/// A buffer offered to the cache is not exactly one decompressed chunk long.
#[derive(Debug, Error)]
#[error("chunk {coord} holds {actual} bytes, cache expects {expected}")]
pub struct ChunkLengthError {
    pub coord: ChunkCoord,
    pub expected: usize,
    pub actual: usize,
}

/// Disk-tier failure. Never returned to callers of the region API; reads degrade to a miss and
/// writes are logged.
#[derive(Debug, Error)]
pub enum DiskIoFailure {
    #[error("disk cache I/O on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("disk cache entry {path:?} holds {actual} bytes, expected {expected}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("region {roi:?} exceeds dataset shape {shape:?} (z, y, x)")]
    OutOfBounds {
        roi: RegionOfInterest,
        shape: [usize; 3],
    },
    #[error("destination holds {actual} samples, region needs {expected}")]
    DestinationSize { expected: usize, actual: usize },
    #[error("slice region must have depth 1, got {depth}")]
    NotASlice { depth: usize },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Volume(#[from] VolumeError),
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("could not allocate {len} samples")]
    Allocation { len: usize },
    #[error("data holds {actual} samples, dims need {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("invalid axis layout {0:?}, expected a permutation of \"zyx\"")]
    InvalidLayout(String),
    #[error("kernel size and stride must be positive (kernel {kernel}, stride {stride})")]
    InvalidPooling { kernel: usize, stride: usize },
    #[error("kernel size must be positive and odd, got {0}")]
    InvalidKernel(usize),
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("could not allocate mesh buffers for {cubes} cubes")]
    Allocation { cubes: usize },
    #[error("{what} buffer holds {len} values, not a multiple of 3")]
    Ragged { what: &'static str, len: usize },
    #[error("index {index} refers past the last of {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{actual} normals for {expected} vertices")]
    NormalCount { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unsupported memory order {0:?}, only row-major arrays are supported")]
    UnsupportedOrder(MemoryOrder),
    #[error("unsupported array format version {0}")]
    UnsupportedFormat(u8),
    #[error("chunk shape {0:?} has an empty axis")]
    EmptyChunkShape([usize; 3]),
    #[error("array shape {0:?} does not fit 32-bit voxel coordinates")]
    ShapeOverflow([usize; 3]),
    #[error("unknown shuffle flag {0}")]
    UnknownShuffle(u8),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("could not create disk cache root {path:?}: {source}")]
    DiskRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache holds {cache}-byte chunks, source produces {source_len}-byte chunks")]
    ChunkLength { cache: usize, source_len: usize },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
