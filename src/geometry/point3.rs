//! 3D point type with integer micrometer coordinates.

use super::Point;
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A 3D point with integer micrometer coordinates.
///
/// The planner queues moves as 3D points so the emission pass can rewrite
/// per-point z for spiral lift without touching the 2D geometry.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3 {
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
}

impl Point3 {
    /// Create a new point.
    #[inline]
    pub const fn new(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z }
    }

    /// Lift a 2D point to 3D at the given z.
    #[inline]
    pub const fn from_xy(p: Point, z: Coord) -> Self {
        Self { x: p.x, y: p.y, z }
    }

    /// Drop the z coordinate.
    #[inline]
    pub const fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Squared length of this vector over all three components.
    #[inline]
    pub fn length_squared(&self) -> i128 {
        self.x as i128 * self.x as i128
            + self.y as i128 * self.y as i128
            + self.z as i128 * self.z as i128
    }

    /// Rounded Euclidean length over all three components.
    #[inline]
    pub fn length(&self) -> Coord {
        (self.length_squared() as f64).sqrt().round() as Coord
    }

    /// Length of this vector in millimeters.
    #[inline]
    pub fn length_mm(&self) -> CoordF {
        (self.length_squared() as f64).sqrt() / crate::SCALING_FACTOR
    }
}

impl Add for Point3 {
    type Output = Point3;

    #[inline]
    fn add(self, other: Point3) -> Point3 {
        Point3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Point3 {
    #[inline]
    fn add_assign(&mut self, other: Point3) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Point3 {
    type Output = Point3;

    #[inline]
    fn sub(self, other: Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl SubAssign for Point3 {
    #[inline]
    fn sub_assign(&mut self, other: Point3) {
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}

impl Neg for Point3 {
    type Output = Point3;

    #[inline]
    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Debug for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
