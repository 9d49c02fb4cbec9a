use crate::Point;

use std::ops::{Add, Sub};

/// An axis-aligned box of voxels, half-open on every axis.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Extent {
    /// First voxel of the box, in volume coordinates.
    minimum: Point,

    /// One past the last voxel on every axis, in volume coordinates.
    world_sup: Point,

    /// `world_sup - minimum`, i.e. the box size.
    local_sup: Point,
}

impl Add<Point> for Extent {
    type Output = Self;

    fn add(self, rhs: Point) -> Extent {
        self.with_minimum(self.minimum + rhs)
    }
}

impl Sub<Point> for Extent {
    type Output = Self;

    fn sub(self, rhs: Point) -> Extent {
        self + (-rhs)
    }
}

impl Extent {
    /// The box `[minimum, world_sup)`.
    pub fn from_min_and_world_supremum(minimum: Point, world_sup: Point) -> Self {
        Self {
            minimum,
            world_sup,
            local_sup: world_sup - minimum,
        }
    }

    /// The box `[minimum, world_max]`, both ends inclusive.
    pub fn from_min_and_world_max(minimum: Point, world_max: Point) -> Self {
        Self::from_min_and_world_supremum(minimum, world_max + Point::fill(1))
    }

    /// The box starting at `minimum` with `local_sup` voxels along each axis.
    pub fn from_min_and_local_supremum(minimum: Point, local_sup: Point) -> Self {
        Self {
            minimum,
            world_sup: minimum + local_sup,
            local_sup,
        }
    }

    pub fn get_minimum(&self) -> Point {
        self.minimum
    }

    /// Last voxel of the box. Meaningless for an empty box.
    pub fn get_world_max(&self) -> Point {
        self.world_sup - Point::fill(1)
    }

    /// Size along each axis.
    pub fn get_local_supremum(&self) -> &Point {
        &self.local_sup
    }

    pub fn get_world_supremum(&self) -> &Point {
        &self.world_sup
    }

    /// Same size, moved to start at `min`.
    pub fn with_minimum(&self, min: Point) -> Self {
        Extent::from_min_and_local_supremum(min, self.local_sup)
    }

    /// Voxel count.
    pub fn volume(&self) -> usize {
        // Disjoint intersections have negative sizes; those count as zero.
        self.local_sup.volume()
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// Offset of `p` from the start of the box.
    pub fn local_point_from_world_point(&self, p: &Point) -> Point {
        *p - self.minimum
    }

    pub fn world_point_from_local_point(&self, p: &Point) -> Point {
        *p + self.minimum
    }

    pub fn contains_world(&self, world_point: &Point) -> bool {
        self.minimum <= *world_point && *world_point < self.world_sup
    }

    /// The (possibly empty) overlap of two boxes.
    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.join(&other.minimum);
        let world_sup = self.world_sup.meet(&other.world_sup);

        Self::from_min_and_world_supremum(minimum, world_sup)
    }

    /// Returns true iff all points in `self` are also in `other`. Empty extents are subsets of
    /// everything.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.is_empty() || self.intersection(other) == *self
    }
}

/// Visits every point of an extent in storage order: `z` outermost, `x` innermost.
#[derive(Debug)]
pub struct ExtentIterator {
    extent: Extent,
    cursor: Point,
    completed: bool,
}

impl ExtentIterator {
    pub fn new(extent: Extent) -> Self {
        ExtentIterator {
            extent,
            cursor: extent.minimum,
            completed: extent.is_empty(),
        }
    }
}

impl Iterator for ExtentIterator {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        if self.completed {
            return None;
        }

        let old_cursor = self.cursor;

        self.cursor.x += 1;
        if self.cursor.x == self.extent.world_sup.x {
            self.cursor.x = self.extent.minimum.x;
            self.cursor.y += 1;
            if self.cursor.y == self.extent.world_sup.y {
                self.cursor.y = self.extent.minimum.y;
                self.cursor.z += 1;
                if self.cursor.z == self.extent.world_sup.z {
                    self.completed = true;
                }
            }
        }

        Some(old_cursor)
    }
}

impl IntoIterator for &Extent {
    type Item = Point;
    type IntoIter = ExtentIterator;

    fn into_iter(self) -> Self::IntoIter {
        ExtentIterator::new(*self)
    }
}

impl IntoIterator for Extent {
    type Item = Point;
    type IntoIter = ExtentIterator;

    fn into_iter(self) -> Self::IntoIter {
        ExtentIterator::new(self)
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
    use crate::test_util::assert_elements_eq;

    #[test]
    fn test_empty_extent_iterator_generates_nothing() {
        let extent = Extent::from_min_and_world_supremum([0, 0, 0].into(), [1, 0, 2].into());

        assert_eq!(extent.into_iter().count(), 0);
    }

    #[test]
    fn test_nonempty_extent_iterator_generates_points_in_storage_order() {
        let extent = Extent::from_min_and_local_supremum([1, 4, 2].into(), [2, 3, 1].into());

        let collected: Vec<_> = extent.into_iter().collect();
        assert_eq!(
            collected,
            vec![
                [1, 4, 2].into(),
                [2, 4, 2].into(),
                [1, 5, 2].into(),
                [2, 5, 2].into(),
                [1, 6, 2].into(),
                [2, 6, 2].into(),
            ]
        );
    }

    #[test]
    fn test_extent_contains_all_iterator_points() {
        let extent = Extent::from_min_and_world_supremum([0, 0, 0].into(), [1, 3, 2].into());

        for p in &extent {
            assert!(extent.contains_world(&p));
        }
    }

    #[test]
    fn test_intersection_of_disjoint_extents_is_empty() {
        let e1 = Extent::from_min_and_local_supremum([0, 0, 0].into(), [4, 4, 4].into());
        let e2 = Extent::from_min_and_local_supremum([4, 0, 0].into(), [4, 4, 4].into());

        assert!(e1.intersection(&e2).is_empty());
    }

    #[test]
    fn test_intersection_points() {
        let e1 = Extent::from_min_and_local_supremum([0, 0, 0].into(), [3, 2, 1].into());
        let e2 = Extent::from_min_and_local_supremum([1, 1, 0].into(), [5, 5, 5].into());

        let points: Vec<Point> = e1.intersection(&e2).into_iter().collect();
        assert_elements_eq(&points, &vec![[1, 1, 0].into(), [2, 1, 0].into()]);
    }

    #[test]
    fn test_subset() {
        let outer = Extent::from_min_and_local_supremum([0, 0, 0].into(), [10, 10, 10].into());
        let inner = Extent::from_min_and_local_supremum([2, 3, 4].into(), [8, 7, 6].into());
        let poking_out = Extent::from_min_and_local_supremum([2, 3, 4].into(), [8, 7, 7].into());

        assert!(inner.is_subset_of(&outer));
        assert!(!poking_out.is_subset_of(&outer));
        assert!(!outer.is_subset_of(&inner));
    }
}
