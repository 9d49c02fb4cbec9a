use crate::{
    ArrayMetadata, CacheConfig, ChunkCoord, CodecError, ConfigError, FetchError, MetadataError,
    RawChunk, SharedChunk, TieredCache, TransportError,
};

use log::{debug, trace};
use std::fs;

/// Delivers the raw (still compressed) bytes stored at a URL. Blocks until done.
pub trait Transport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<Vec<u8>, TransportError>,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self(url)
    }
}

/// Reads chunks from a local directory tree laid out like the remote store. URLs are plain
/// paths, optionally prefixed with `file://`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let path = url.strip_prefix("file://").unwrap_or(url);

        fs::read(path).map_err(|e| TransportError::new(url, e))
    }
}

/// Turns one chunk's on-wire bytes into exactly `expected_len` bytes of samples. Producing any
/// other length is an error, never a silent truncation.
pub trait Decompress {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;
}

/// Raw LZ4 blocks without a size prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4Codec;

impl Decompress for Lz4Codec {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        if expected_len > i32::MAX as usize {
            return Err(CodecError::Rejected(format!(
                "chunk of {} bytes exceeds the LZ4 block limit",
                expected_len
            )));
        }
        let bytes = lz4::block::decompress(compressed, Some(expected_len as i32))
            .map_err(|e| CodecError::Rejected(e.to_string()))?;

        check_len(bytes, expected_len)
    }
}

/// Chunks stored without compression.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawCodec;

impl Decompress for RawCodec {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        check_len(compressed.to_vec(), expected_len)
    }
}

fn check_len(bytes: Vec<u8>, expected: usize) -> Result<Vec<u8>, CodecError> {
    if bytes.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes)
}

/// Produces decompressed chunks of one remote array and is the only thing that fills a
/// `TieredCache` on a full miss.
#[derive(Debug)]
pub struct ChunkSource<T, C> {
    base_url: String,
    metadata: ArrayMetadata,
    transport: T,
    codec: C,
}

impl<T: Transport, C: Decompress> ChunkSource<T, C> {
    pub fn new(
        base_url: impl Into<String>,
        metadata: ArrayMetadata,
        transport: T,
        codec: C,
    ) -> Result<Self, MetadataError> {
        metadata.validate()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(ChunkSource {
            base_url,
            metadata,
            transport,
            codec,
        })
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    /// An empty cache sized for this array's chunks.
    pub fn new_cache(&self, config: &CacheConfig) -> Result<TieredCache, ConfigError> {
        TieredCache::new(config, self.metadata.chunk_byte_len())
    }

    /// `{base_url}/{z}/{y}/{x}`, most significant axis first.
    pub fn url_for(&self, coord: &ChunkCoord) -> String {
        format!("{}/{}/{}/{}", self.base_url, coord.z, coord.y, coord.x)
    }

    /// Returns the chunk from `cache` if either tier has it, otherwise fetches it.
    pub fn resolve(
        &self,
        cache: &mut TieredCache,
        coord: &ChunkCoord,
    ) -> Result<SharedChunk, FetchError> {
        if let Some(chunk) = cache.get(coord) {
            return Ok(chunk);
        }

        self.fetch(cache, coord)
    }

    /// Downloads and decompresses one chunk, then stores it in both cache tiers. No retries.
    pub fn fetch(
        &self,
        cache: &mut TieredCache,
        coord: &ChunkCoord,
    ) -> Result<SharedChunk, FetchError> {
        let url = self.url_for(coord);
        debug!("Fetching chunk {} from {}", coord, url);

        let compressed = match self.transport.fetch(&url) {
            Ok(bytes) => bytes,
            Err(source) => {
                return Err(FetchError::TransportFailure {
                    coord: *coord,
                    url,
                    source,
                })
            }
        };
        trace!("Chunk {}: {} compressed bytes", coord, compressed.len());

        let expected_len = self.metadata.chunk_byte_len();
        let decoded = self
            .codec
            .decompress(&compressed, expected_len)
            .and_then(|bytes| check_len(bytes, expected_len));
        let bytes = match decoded {
            Ok(bytes) => bytes,
            Err(source) => {
                return Err(FetchError::DecodeFailure {
                    coord: *coord,
                    url,
                    source,
                })
            }
        };

        cache
            .put(*coord, RawChunk::new(bytes))
            .map_err(|e| FetchError::DecodeFailure {
                coord: *coord,
                url,
                source: CodecError::SizeMismatch {
                    expected: e.expected,
                    actual: e.actual,
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dtype, Point};

    use std::cell::Cell;

    fn metadata() -> ArrayMetadata {
        ArrayMetadata::new([8, 8, 8], [4, 4, 4], Dtype::U8)
    }

    #[test]
    fn url_layout_is_zyx() {
        let source =
            ChunkSource::new("http://host/vol.zarr/0/", metadata(), FileTransport, RawCodec)
                .unwrap();

        assert_eq!(
            source.url_for(&Point::new(30, 20, 10)),
            "http://host/vol.zarr/0/10/20/30"
        );
    }

    #[test]
    fn lz4_round_trip_and_size_contract() {
        let raw: Vec<u8> = (0..64).map(|i| (i % 7) as u8).collect();
        let compressed = lz4::block::compress(&raw, None, false).unwrap();

        assert_eq!(Lz4Codec.decompress(&compressed, 64).unwrap(), raw);
        assert!(Lz4Codec.decompress(&compressed, 65).is_err());
        assert!(Lz4Codec.decompress(&[0xff, 0x00, 0x12], 64).is_err());
    }

    #[test]
    fn raw_codec_rejects_short_input() {
        match RawCodec.decompress(&[1, 2, 3], 4) {
            Err(CodecError::SizeMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (4, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn resolve_fetches_once() {
        let calls = Cell::new(0);
        let transport = |_: &str| {
            calls.set(calls.get() + 1);
            Ok(vec![1u8; 64])
        };
        let source = ChunkSource::new("mem://", metadata(), transport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(4)).unwrap();

        let key = Point::new(1, 0, 1);
        source.resolve(&mut cache, &key).unwrap();
        source.resolve(&mut cache, &key).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(cache.contains(&key));
    }

    #[test]
    fn transport_failure_carries_url() {
        let transport = |url: &str| Err(TransportError::new(url, "404 Not Found"));
        let source = ChunkSource::new("mem://vol", metadata(), transport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(4)).unwrap();

        match source.fetch(&mut cache, &Point::new(0, 1, 0)) {
            Err(FetchError::TransportFailure { url, .. }) => assert_eq!(url, "mem://vol/0/1/0"),
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn decode_failure_does_not_populate_cache() {
        let transport = |_: &str| Ok(vec![0u8; 10]);
        let source = ChunkSource::new("mem://vol", metadata(), transport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(4)).unwrap();

        assert!(matches!(
            source.fetch(&mut cache, &Point::zero()),
            Err(FetchError::DecodeFailure { .. })
        ));
        assert!(cache.is_empty());
    }

    /// Trusts the caller's length and hands back half of it.
    struct HalvingCodec;

    impl Decompress for HalvingCodec {
        fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
            Ok(compressed[..expected_len / 2].to_vec())
        }
    }

    #[test]
    fn short_codec_output_is_a_decode_failure() {
        let transport = |_: &str| Ok(vec![3u8; 64]);
        let source = ChunkSource::new("mem://vol", metadata(), transport, HalvingCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(4)).unwrap();

        match source.fetch(&mut cache, &Point::zero()) {
            Err(FetchError::DecodeFailure {
                source: CodecError::SizeMismatch { expected, actual },
                ..
            }) => assert_eq!((expected, actual), (64, 32)),
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn truncated_disk_entry_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Cell::new(0);
        let transport = |_: &str| {
            calls.set(calls.get() + 1);
            Ok(vec![6u8; 64])
        };
        let source = ChunkSource::new("mem://vol", metadata(), transport, RawCodec).unwrap();
        let config = CacheConfig::memory_only(4).with_disk_root(dir.path());
        let mut cache = source.new_cache(&config).unwrap();

        let key = Point::new(1, 1, 0);
        let disk = cache.disk().unwrap().clone();
        disk.put(&key, &RawChunk::new(vec![6u8; 5])).unwrap();

        let chunk = source.resolve(&mut cache, &key).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(chunk.as_bytes(), &[6u8; 64][..]);
        assert_eq!(disk.get(&key, 64).unwrap().unwrap().len(), 64);
    }

    #[test]
    fn file_transport_reads_mirror_layout() {
        let dir = tempfile::tempdir().unwrap();
        let chunk_dir = dir.path().join("0").join("1");
        std::fs::create_dir_all(&chunk_dir).unwrap();
        std::fs::write(chunk_dir.join("1"), vec![9u8; 64]).unwrap();

        let base = dir.path().to_str().unwrap().to_string();
        let source = ChunkSource::new(base, metadata(), FileTransport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(1)).unwrap();

        let chunk = source.resolve(&mut cache, &Point::new(1, 1, 0)).unwrap();
        assert_eq!(chunk.as_bytes(), &[9u8; 64][..]);
        assert!(source.resolve(&mut cache, &Point::new(0, 0, 0)).is_err());
    }
}
