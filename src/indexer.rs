use crate::Point;

/// Describes how to convert from a 3D point to a linear array index (and back).
pub trait Indexer {
    /// `s` is the local strict supremum of an extent. `p` is a local point.
    fn index_from_local_point(s: &Point, p: &Point) -> usize;

    /// `s` is the local strict supremum of an extent. `index` is a linear index.
    fn local_point_from_index(s: &Point, index: usize) -> Point;
}

/// Row-major layout with `z` outermost and `x` innermost. This is the layout of every chunk in
/// the remote store and of every dense tensor, so one `x` row is always contiguous.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ZyxIndexer;

impl Indexer for ZyxIndexer {
    #[inline]
    fn index_from_local_point(s: &Point, p: &Point) -> usize {
        let (sx, sy) = (s.x as usize, s.y as usize);

        p.z as usize * sy * sx + p.y as usize * sx + p.x as usize
    }

    fn local_point_from_index(s: &Point, index: usize) -> Point {
        let (sx, sy) = (s.x as usize, s.y as usize);
        let xy_area = sx * sy;
        let z = index / xy_area;
        let rem = index - z * xy_area;
        let y = rem / sx;
        let x = rem - y * sx;

        Point::new(x as i32, y as i32, z as i32)
    }
}
