//! Mapping between global voxel coordinates and (chunk, offset-within-chunk) pairs.
//!
//! All functions are pure. Coordinates are expected to be non-negative; a negative coordinate is
//! a caller error and is only checked in debug builds.

use crate::{ChunkCoord, Extent, LocalOffset, Point};

use std::ops::Range;

/// Splits a global voxel coordinate into the chunk that holds it and its offset inside that chunk.
pub fn to_chunk(coord: &Point, chunk_shape: &Point) -> (ChunkCoord, LocalOffset) {
    debug_assert!(coord.is_non_negative(), "negative voxel coordinate {}", coord);

    (*coord / *chunk_shape, *coord % *chunk_shape)
}

/// The extent (in chunk-grid space) of every chunk overlapping `extent`, inclusive on both ends.
pub fn chunk_range(extent: &Extent, chunk_shape: &Point) -> Extent {
    let key_min = extent.get_minimum() / *chunk_shape;
    let key_max = extent.get_world_max() / *chunk_shape;

    Extent::from_min_and_world_max(key_min, key_max)
}

/// The voxels owned by the chunk at `key`, in global coordinates.
pub fn chunk_extent(key: &ChunkCoord, chunk_shape: &Point) -> Extent {
    Extent::from_min_and_local_supremum(*key * *chunk_shape, *chunk_shape)
}

/// On one axis, the chunk-local range of samples that a region `[start, start + len)` takes from
/// the chunk with index `chunk`.
///
/// The first chunk on the axis starts at `start % chunk_len`, the last one stops after
/// `(start + len - 1) % chunk_len`, and interior chunks contribute their full range.
pub fn local_span(start: i32, len: i32, chunk: i32, chunk_len: i32) -> Range<i32> {
    debug_assert!(len > 0);

    let first_chunk = start / chunk_len;
    let last = start + len - 1;
    let last_chunk = last / chunk_len;
    debug_assert!(first_chunk <= chunk && chunk <= last_chunk);

    let begin = if chunk == first_chunk {
        start % chunk_len
    } else {
        0
    };
    let end = if chunk == last_chunk {
        last % chunk_len + 1
    } else {
        chunk_len
    };

    begin..end
}

/// The sub-block of the chunk at `key` that lies inside `region`, in chunk-local coordinates.
pub fn local_extent(region: &Extent, key: &ChunkCoord, chunk_shape: &Point) -> Extent {
    let min = region.get_minimum();
    let size = region.get_local_supremum();

    let x = local_span(min.x, size.x, key.x, chunk_shape.x);
    let y = local_span(min.y, size.y, key.y, chunk_shape.y);
    let z = local_span(min.z, size.z, key.z, chunk_shape.z);

    Extent::from_min_and_world_supremum(
        Point::new(x.start, y.start, z.start),
        Point::new(x.end, y.end, z.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_chunk() {
        let shape = Point::fill(128);

        let (key, offset) = to_chunk(&Point::new(3693, 2881, 6604), &shape);
        assert_eq!(key, Point::new(28, 22, 51));
        assert_eq!(offset, Point::new(109, 65, 76));

        let (key, offset) = to_chunk(&Point::new(128, 127, 0), &shape);
        assert_eq!(key, Point::new(1, 0, 0));
        assert_eq!(offset, Point::new(0, 127, 0));
    }

    #[test]
    fn test_chunk_range_is_inclusive() {
        let shape = Point::new(4, 4, 4);
        let region = Extent::from_min_and_local_supremum([3, 0, 4].into(), [2, 4, 1].into());

        let keys: Vec<Point> = chunk_range(&region, &shape).into_iter().collect();
        assert_eq!(keys, vec![[0, 0, 1].into(), [1, 0, 1].into()]);
    }

    #[test]
    fn test_local_span_edges() {
        // Region [5, 15) over chunks of length 4: chunks 1, 2, 3.
        assert_eq!(local_span(5, 10, 1, 4), 1..4);
        assert_eq!(local_span(5, 10, 2, 4), 0..4);
        assert_eq!(local_span(5, 10, 3, 4), 0..3);

        // A region inside a single chunk is clipped on both ends.
        assert_eq!(local_span(5, 2, 1, 4), 1..3);

        // A region ending exactly on a chunk boundary takes the whole last chunk.
        assert_eq!(local_span(4, 8, 2, 4), 0..4);
    }

    #[test]
    fn test_local_extent_matches_intersection() {
        let shape = Point::new(4, 5, 3);
        let region = Extent::from_min_and_local_supremum([2, 3, 1].into(), [9, 6, 7].into());

        for key in chunk_range(&region, &shape) {
            let owned = chunk_extent(&key, &shape);
            let expected = owned.intersection(&region) - owned.get_minimum();

            assert_eq!(local_extent(&region, &key, &shape), expected);
        }
    }
}
