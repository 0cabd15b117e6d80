//! 2D point type with integer micrometer coordinates.

use crate::{unscale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 2D point with integer micrometer coordinates.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

/// A collection of points.
pub type Points = Vec<Point>;

impl Point {
    /// Create a new point.
    #[inline]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Create a point from millimeter coordinates.
    #[inline]
    pub fn new_scale(x: CoordF, y: CoordF) -> Self {
        Self {
            x: crate::scale(x),
            y: crate::scale(y),
        }
    }

    /// Dot product with another vector.
    #[inline]
    pub fn dot(&self, other: &Point) -> i128 {
        self.x as i128 * other.x as i128 + self.y as i128 * other.y as i128
    }

    /// Cross product with another vector (scalar z-component).
    #[inline]
    pub fn cross(&self, other: &Point) -> i128 {
        self.x as i128 * other.y as i128 - self.y as i128 * other.x as i128
    }

    /// The right-hand perpendicular: (x, y) -> (y, -x).
    #[inline]
    pub fn perp_right(&self) -> Point {
        Point::new(self.y, -self.x)
    }

    /// Squared length of this vector.
    #[inline]
    pub fn length_squared(&self) -> i128 {
        self.x as i128 * self.x as i128 + self.y as i128 * self.y as i128
    }

    /// Rounded Euclidean length of this vector.
    #[inline]
    pub fn length(&self) -> Coord {
        (self.length_squared() as f64).sqrt().round() as Coord
    }

    /// Length of this vector in millimeters.
    #[inline]
    pub fn length_mm(&self) -> CoordF {
        (self.length_squared() as f64).sqrt() / crate::SCALING_FACTOR
    }

    /// Whether this vector is strictly shorter than `len`.
    ///
    /// Compares squared magnitudes so no square root is taken.
    #[inline]
    pub fn shorter_than(&self, len: Coord) -> bool {
        self.length_squared() < len as i128 * len as i128
    }

    /// Whether this vector is strictly longer than `len`.
    #[inline]
    pub fn longer_than(&self, len: Coord) -> bool {
        self.length_squared() > len as i128 * len as i128
    }

    /// Scale this vector so its integer length rounds to `target_len`.
    ///
    /// Computed as `v * target_len / length(v)` in integer arithmetic.
    /// The zero vector is returned unchanged.
    pub fn normal(&self, target_len: Coord) -> Point {
        let len = self.length();
        if len == 0 {
            return *self;
        }
        Point::new(
            (self.x as i128 * target_len as i128 / len as i128) as Coord,
            (self.y as i128 * target_len as i128 / len as i128) as Coord,
        )
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point) -> Coord {
        (*other - *self).length()
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(&self, other: &Point) -> i128 {
        (*other - *self).length_squared()
    }

    /// Project this point onto the segment a-b, clamping to the segment.
    pub fn project_onto_segment(&self, a: Point, b: Point) -> Point {
        let ab = b - a;
        let len_sq = ab.length_squared();
        if len_sq == 0 {
            return a;
        }
        let t = (*self - a).dot(&ab);
        if t <= 0 {
            return a;
        }
        if t >= len_sq {
            return b;
        }
        Point::new(
            a.x + (ab.x as i128 * t / len_sq) as Coord,
            a.y + (ab.y as i128 * t / len_sq) as Coord,
        )
    }
}

impl Add for Point {
    type Output = Point;

    #[inline]
    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Point {
    #[inline]
    fn add_assign(&mut self, other: Point) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Point {
    type Output = Point;

    #[inline]
    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Point {
    #[inline]
    fn sub_assign(&mut self, other: Point) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Point {
    type Output = Point;

    #[inline]
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Mul<Coord> for Point {
    type Output = Point;

    #[inline]
    fn mul(self, rhs: Coord) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<Coord> for Point {
    type Output = Point;

    #[inline]
    fn div(self, rhs: Coord) -> Point {
        Point::new(self.x / rhs, self.y / rhs)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", unscale(self.x), unscale(self.y))
    }
}
