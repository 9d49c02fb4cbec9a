use crate::{
    addressing::{chunk_range, local_extent, to_chunk},
    AssemblerError, ChunkSource, ConfigError, Decompress, DenseSlice, DenseVolume, Extent, Indexer, Point,
    TieredCache, Transport, ZyxIndexer,
};

use itertools::iproduct;
use log::trace;
use serde::{Deserialize, Serialize};

/// An axis-aligned box of voxels requested from the dataset.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct RegionOfInterest {
    pub x_start: usize,
    pub x_width: usize,
    pub y_start: usize,
    pub y_height: usize,
    pub z_start: usize,
    pub z_depth: usize,
}

impl RegionOfInterest {
    /// `start` and `size` are given as `[x, y, z]`.
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        RegionOfInterest {
            x_start: start[0],
            x_width: size[0],
            y_start: start[1],
            y_height: size[1],
            z_start: start[2],
            z_depth: size[2],
        }
    }

    /// A single image of the stack at depth `z`.
    pub fn slice(x_start: usize, x_width: usize, y_start: usize, y_height: usize, z: usize) -> Self {
        Self::new([x_start, y_start, z], [x_width, y_height, 1])
    }

    /// Size as `[z, y, x]`, the layout of the destination buffer.
    pub fn dims(&self) -> [usize; 3] {
        [self.z_depth, self.y_height, self.x_width]
    }

    /// Number of voxels, which is also the length the destination buffer must have.
    pub fn volume(&self) -> usize {
        self.x_width * self.y_height * self.z_depth
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// True iff `start + size <= shape` on every axis. `shape` is `[z, y, x]`.
    pub fn fits_within(&self, shape: &[usize; 3]) -> bool {
        let fits = |start: usize, len: usize, dim: usize| {
            start.checked_add(len).map_or(false, |end| end <= dim)
        };

        fits(self.z_start, self.z_depth, shape[0])
            && fits(self.y_start, self.y_height, shape[1])
            && fits(self.x_start, self.x_width, shape[2])
    }

    /// Only meaningful once `fits_within` holds for a shape that fits `i32`.
    fn to_extent(&self) -> Extent {
        Extent::from_min_and_local_supremum(
            Point::new(self.x_start as i32, self.y_start as i32, self.z_start as i32),
            Point::new(self.x_width as i32, self.y_height as i32, self.z_depth as i32),
        )
    }
}

/// Stitches regions of the dataset together from the chunks that cover them, pulling each chunk
/// through the cache and falling back to the source on a miss.
pub struct RegionAssembler<'a, T, C> {
    source: &'a ChunkSource<T, C>,
    cache: &'a mut TieredCache,
}

impl<'a, T: Transport, C: Decompress> RegionAssembler<'a, T, C> {
    /// Fails if `cache` was sized for a different chunk length than `source` produces.
    pub fn new(
        source: &'a ChunkSource<T, C>,
        cache: &'a mut TieredCache,
    ) -> Result<Self, ConfigError> {
        let source_len = source.metadata().chunk_byte_len();
        if cache.chunk_byte_len() != source_len {
            return Err(ConfigError::ChunkLength {
                cache: cache.chunk_byte_len(),
                source_len,
            });
        }

        Ok(RegionAssembler { source, cache })
    }

    pub fn cache(&self) -> &TieredCache {
        &*self.cache
    }

    fn check_bounds(&self, roi: &RegionOfInterest) -> Result<Extent, AssemblerError> {
        let shape = self.source.metadata().shape;
        if !roi.fits_within(&shape) {
            return Err(AssemblerError::OutOfBounds { roi: *roi, shape });
        }

        Ok(roi.to_extent())
    }

    /// Writes every voxel of `roi` into `dest`, laid out `[z][y][x]` relative to the region's
    /// minimum. `dest.len()` must equal `roi.volume()`.
    ///
    /// Bounds are checked before any chunk is resolved. If a chunk cannot be fetched, the
    /// remaining chunks are skipped and the contents of `dest` are unspecified.
    pub fn fill_roi(
        &mut self,
        roi: &RegionOfInterest,
        dest: &mut [f32],
    ) -> Result<(), AssemblerError> {
        let region = self.check_bounds(roi)?;
        if dest.len() != roi.volume() {
            return Err(AssemblerError::DestinationSize {
                expected: roi.volume(),
                actual: dest.len(),
            });
        }
        if region.is_empty() {
            return Ok(());
        }

        let metadata = self.source.metadata();
        let chunk_shape = metadata.chunk_point();
        let dtype = metadata.dtype;
        let roi_min = region.get_minimum();
        let roi_size = *region.get_local_supremum();

        for key in &chunk_range(&region, &chunk_shape) {
            let chunk = self.source.resolve(self.cache, &key)?;
            let bytes = chunk.as_bytes();

            let local = local_extent(&region, &key, &chunk_shape);
            let lmin = local.get_minimum();
            let lsup = *local.get_world_supremum();
            let run = (lsup.x - lmin.x) as usize;
            let chunk_min = key * chunk_shape;
            trace!("Chunk {}: copying local {:?}", key, local);

            for (z, y) in iproduct!(lmin.z..lsup.z, lmin.y..lsup.y) {
                let row = Point::new(lmin.x, y, z);
                let src = ZyxIndexer::index_from_local_point(&chunk_shape, &row);
                let dst =
                    ZyxIndexer::index_from_local_point(&roi_size, &(chunk_min + row - roi_min));
                dtype.decode_run(bytes, src, &mut dest[dst..dst + run]);
            }
        }

        Ok(())
    }

    /// `fill_roi` for a region exactly one voxel deep; `dest` is laid out `[y][x]`.
    pub fn fill_slice(
        &mut self,
        roi: &RegionOfInterest,
        dest: &mut [f32],
    ) -> Result<(), AssemblerError> {
        if roi.z_depth != 1 {
            return Err(AssemblerError::NotASlice { depth: roi.z_depth });
        }

        self.fill_roi(roi, dest)
    }

    /// The value of one voxel.
    pub fn get_voxel(&mut self, x: usize, y: usize, z: usize) -> Result<f32, AssemblerError> {
        let roi = RegionOfInterest::new([x, y, z], [1, 1, 1]);
        let p = self.check_bounds(&roi)?.get_minimum();

        let metadata = self.source.metadata();
        let chunk_shape = metadata.chunk_point();
        let (key, offset) = to_chunk(&p, &chunk_shape);
        let chunk = self.source.resolve(self.cache, &key)?;

        Ok(metadata.dtype.sample(
            chunk.as_bytes(),
            ZyxIndexer::index_from_local_point(&chunk_shape, &offset),
        ))
    }

    /// Allocates a volume the size of `roi` and fills it.
    pub fn read_volume(&mut self, roi: &RegionOfInterest) -> Result<DenseVolume, AssemblerError> {
        self.check_bounds(roi)?;
        let mut volume = DenseVolume::try_zeros(roi.dims())?;
        self.fill_roi(roi, volume.as_mut_slice())?;

        Ok(volume)
    }

    /// Allocates a slice the size of `roi` (which must be one voxel deep) and fills it.
    pub fn read_slice(&mut self, roi: &RegionOfInterest) -> Result<DenseSlice, AssemblerError> {
        if roi.z_depth != 1 {
            return Err(AssemblerError::NotASlice { depth: roi.z_depth });
        }
        self.check_bounds(roi)?;
        let mut slice = DenseSlice::try_zeros([roi.y_height, roi.x_width])?;
        self.fill_slice(roi, slice.as_mut_slice())?;

        Ok(slice)
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        addressing::chunk_extent, ArrayMetadata, CacheConfig, Dtype, FetchError, RawCodec,
        TransportError,
    };

    use std::cell::Cell;

    const CHUNK: usize = 4;
    // z, y, x; none a multiple of the chunk size.
    const SHAPE: [usize; 3] = [6, 7, 9];

    fn value_at(p: &Point) -> u8 {
        ((p.x + 3 * p.y + 7 * p.z) % 251) as u8
    }

    /// Serves a synthetic dataset and counts the requests it sees.
    fn counting_transport<'c>(
        calls: &'c Cell<usize>,
    ) -> impl Fn(&str) -> Result<Vec<u8>, TransportError> + 'c {
        move |url: &str| {
            calls.set(calls.get() + 1);
            let xyz: Vec<i32> = url.rsplit('/').take(3).map(|s| s.parse().unwrap()).collect();
            let key = Point::new(xyz[0], xyz[1], xyz[2]);

            Ok(chunk_extent(&key, &Point::fill(CHUNK as i32))
                .into_iter()
                .map(|p| value_at(&p))
                .collect())
        }
    }

    fn source<'c>(
        calls: &'c Cell<usize>,
    ) -> ChunkSource<impl Fn(&str) -> Result<Vec<u8>, TransportError> + 'c, RawCodec> {
        let metadata = ArrayMetadata::new(SHAPE, [CHUNK; 3], Dtype::U8);

        ChunkSource::new("mem://vol", metadata, counting_transport(calls), RawCodec).unwrap()
    }

    #[test]
    fn cache_for_another_chunk_size_is_rejected() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = TieredCache::new(&CacheConfig::memory_only(4), 16).unwrap();

        assert!(matches!(
            RegionAssembler::new(&source, &mut cache),
            Err(ConfigError::ChunkLength {
                cache: 16,
                source_len: 64
            })
        ));
    }

    #[test]
    fn fill_roi_stitches_partial_chunks() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(64)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([2, 1, 3], [7, 6, 3]);
        let mut dest = vec![-1.0; roi.volume()];
        assembler.fill_roi(&roi, &mut dest).unwrap();

        let expected: Vec<f32> = roi
            .to_extent()
            .into_iter()
            .map(|p| value_at(&p) as f32)
            .collect();
        assert_eq!(dest, expected);

        // x chunks 0..=2, y chunks 0..=1, z chunks 0..=1
        assert_eq!(calls.get(), 12);
        assert_eq!(assembler.cache().len(), 12);
    }

    #[test]
    fn bulk_and_point_access_agree() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(2)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([3, 0, 1], [5, 7, 4]);
        let volume = assembler.read_volume(&roi).unwrap();

        for p in &roi.to_extent() {
            let local = p - roi.to_extent().get_minimum();
            assert_eq!(
                assembler
                    .get_voxel(p.x as usize, p.y as usize, p.z as usize)
                    .unwrap(),
                volume.get(local.z as usize, local.y as usize, local.x as usize)
            );
        }
    }

    #[test]
    fn out_of_bounds_fetches_nothing() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(8)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([0, 0, 4], [2, 2, 3]);
        let mut dest = vec![0.0; roi.volume()];
        assert!(matches!(
            assembler.fill_roi(&roi, &mut dest),
            Err(AssemblerError::OutOfBounds { .. })
        ));

        let overflowing = RegionOfInterest::new([usize::MAX, 0, 0], [2, 1, 1]);
        assert!(matches!(
            assembler.fill_roi(&overflowing, &mut [0.0; 2]),
            Err(AssemblerError::OutOfBounds { .. })
        ));
        assert!(assembler.get_voxel(9, 0, 0).is_err());

        assert_eq!(calls.get(), 0);
        assert!(dest.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn destination_must_match_region() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(8)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([0, 0, 0], [2, 2, 2]);
        match assembler.fill_roi(&roi, &mut [0.0; 7]) {
            Err(AssemblerError::DestinationSize { expected, actual }) => {
                assert_eq!((expected, actual), (8, 7));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn empty_region_is_a_no_op() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(8)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([1, 1, 1], [0, 3, 3]);
        assembler.fill_roi(&roi, &mut []).unwrap();

        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn slices_must_be_one_deep() {
        let calls = Cell::new(0);
        let source = source(&calls);
        let mut cache = source.new_cache(&CacheConfig::memory_only(8)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let thick = RegionOfInterest::new([0, 0, 0], [2, 2, 2]);
        assert!(matches!(
            assembler.read_slice(&thick),
            Err(AssemblerError::NotASlice { depth: 2 })
        ));

        let slice = assembler
            .read_slice(&RegionOfInterest::slice(1, 8, 2, 5, 5))
            .unwrap();
        assert_eq!(slice.dims(), [5, 8]);
        assert_eq!(slice.get(4, 7), value_at(&Point::new(8, 6, 5)) as f32);
    }

    #[test]
    fn fetch_errors_abort_the_fill() {
        let transport = |url: &str| Err(TransportError::new(url, "connection refused"));
        let metadata = ArrayMetadata::new(SHAPE, [CHUNK; 3], Dtype::U8);
        let source = ChunkSource::new("mem://vol", metadata, transport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(8)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        let roi = RegionOfInterest::new([0, 0, 0], [5, 1, 1]);
        match assembler.fill_roi(&roi, &mut [0.0; 5]) {
            Err(AssemblerError::Fetch(FetchError::TransportFailure { coord, .. })) => {
                assert_eq!(coord, Point::zero());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wide_samples_are_little_endian() {
        let transport = |_: &str| {
            Ok((0u16..8)
                .flat_map(|i| (1000 + i).to_le_bytes().to_vec())
                .collect())
        };
        let metadata = ArrayMetadata::new([2, 2, 2], [2, 2, 2], Dtype::U16);
        let source = ChunkSource::new("mem://u16", metadata, transport, RawCodec).unwrap();
        let mut cache = source.new_cache(&CacheConfig::memory_only(1)).unwrap();
        let mut assembler = RegionAssembler::new(&source, &mut cache).unwrap();

        assert_eq!(assembler.get_voxel(1, 0, 1).unwrap(), 1005.0);
        let volume = assembler
            .read_volume(&RegionOfInterest::new([0, 0, 0], [2, 2, 2]))
            .unwrap();
        assert_eq!(volume.as_slice()[7], 1007.0);
    }
}
