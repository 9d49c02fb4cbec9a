use num::Integer;
use serde::{Deserialize, Serialize};
use std::cmp::{max, min, Ordering};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// A point on the integer voxel lattice. Components are stored `x, y, z`, but everything that
/// touches sample memory orders them `z, y, x` (see `Point::zyx`).
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Identifies one chunk in the dataset's chunk grid.
pub type ChunkCoord = Point;

/// A voxel coordinate relative to the minimum of the chunk that contains it.
pub type LocalOffset = Point;

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<[i32; 3]> for Point {
    fn from(other: [i32; 3]) -> Self {
        Point::new(other[0], other[1], other[2])
    }
}

impl Point {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        [0, 0, 0].into()
    }

    pub fn fill(value: i32) -> Self {
        [value; 3].into()
    }

    /// Builds a point from components given in storage order.
    pub fn from_zyx(zyx: [i32; 3]) -> Self {
        Point::new(zyx[2], zyx[1], zyx[0])
    }

    /// Components in storage order, most significant axis first.
    pub fn zyx(&self) -> [i32; 3] {
        [self.z, self.y, self.x]
    }

    pub fn join(&self, other: &Self) -> Self {
        [
            max(self.x, other.x),
            max(self.y, other.y),
            max(self.z, other.z),
        ]
        .into()
    }

    pub fn meet(&self, other: &Self) -> Self {
        [
            min(self.x, other.x),
            min(self.y, other.y),
            min(self.z, other.z),
        ]
        .into()
    }

    /// Product of the components, i.e. the number of lattice points in a box of this size.
    /// Negative components count as zero.
    pub fn volume(&self) -> usize {
        self.x.max(0) as usize * self.y.max(0) as usize * self.z.max(0) as usize
    }

    pub fn is_non_negative(&self) -> bool {
        self.x >= 0 && self.y >= 0 && self.z >= 0
    }
}

/// This particular partial order allows us to say that an extent contains a point iff
/// p is GEQ the minimum of the extent and p is LT the supremum of the extent.
impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self < other {
            Some(Ordering::Less)
        } else if self > other {
            Some(Ordering::Greater)
        } else if self.x == other.x && self.y == other.y && self.z == other.z {
            Some(Ordering::Equal)
        } else {
            None
        }
    }

    fn lt(&self, other: &Self) -> bool {
        self.x < other.x && self.y < other.y && self.z < other.z
    }

    fn gt(&self, other: &Self) -> bool {
        self.x > other.x && self.y > other.y && self.z > other.z
    }

    fn le(&self, other: &Self) -> bool {
        self.x <= other.x && self.y <= other.y && self.z <= other.z
    }

    fn ge(&self, other: &Self) -> bool {
        self.x >= other.x && self.y >= other.y && self.z >= other.z
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        [self.x + other.x, self.y + other.y, self.z + other.z].into()
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self {
        [-self.x, -self.y, -self.z].into()
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Mul<Point> for Point {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        [other.x * self.x, other.y * self.y, other.z * self.z].into()
    }
}

/// Component-wise floor division. For non-negative points this is plain integer division.
impl Div<Point> for Point {
    type Output = Self;

    fn div(self, rhs: Point) -> Self {
        [
            self.x.div_floor(&rhs.x),
            self.y.div_floor(&rhs.y),
            self.z.div_floor(&rhs.z),
        ]
        .into()
    }
}

/// Component-wise floor modulus, so the result always lies in `[0, rhs)` for positive `rhs`.
impl Rem<Point> for Point {
    type Output = Self;

    fn rem(self, rhs: Point) -> Self {
        [
            self.x.mod_floor(&rhs.x),
            self.y.mod_floor(&rhs.y),
            self.z.mod_floor(&rhs.z),
        ]
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_and_rem_agree_with_reconstruction() {
        let size = Point::new(128, 64, 32);
        for p in [
            Point::new(0, 0, 0),
            Point::new(127, 63, 31),
            Point::new(128, 64, 32),
            Point::new(3693, 2881, 6604),
        ]
        .iter()
        {
            let q = *p / size;
            let r = *p % size;
            assert_eq!(q * size + r, *p);
            assert!(r >= Point::zero() && r < size);
        }
    }

    #[test]
    fn test_zyx_round_trip() {
        let p = Point::new(1, 2, 3);
        assert_eq!(p.zyx(), [3, 2, 1]);
        assert_eq!(Point::from_zyx(p.zyx()), p);
    }

    #[test]
    fn test_partial_order_is_componentwise() {
        let a = Point::new(0, 5, 0);
        let b = Point::new(1, 1, 1);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(Point::zero() <= a);
        assert!(Point::zero() < b);
    }
}
