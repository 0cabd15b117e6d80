//! Geometry primitives for the planner.
//!
//! This module provides the fundamental geometric types used by the
//! toolpath planner:
//! - [`Point`] - 2D point with integer micrometer coordinates
//! - [`Point3`] - 3D point with integer micrometer coordinates
//! - [`Polygon`] - Closed polygon (boundary)
//! - [`Segment`] - Directed 3D segment with an extrusion width annotation
//!
//! ## Coordinate System
//!
//! The planner uses integer micrometers internally to avoid floating-point
//! precision issues. 1 unit = 1 µm, so 1mm = 1_000 units.
//!
//! - Use `scale()` to convert from mm to internal units
//! - Use `unscale()` to convert from internal units to mm

mod point;
mod point3;
mod polygon;
mod segment;

pub use point::{Point, Points};
pub use point3::Point3;
pub use polygon::{Polygon, Polygons};
pub use segment::{
    make_close_segments_mergeable, path_to_segments, split_segment_for_vertices, Segment,
};

use crate::Coord;

/// Midpoint of two 3D points.
#[inline]
pub fn midpoint3(a: Point3, b: Point3) -> Point3 {
    Point3::new((a.x + b.x) / 2, (a.y + b.y) / 2, (a.z + b.z) / 2)
}

/// Intersection parameter of segment a1-a2 with segment b1-b2, as a
/// fraction of a1-a2, if the segments properly intersect.
///
/// Uses the cross product method; collinear overlap counts as no
/// intersection, shared endpoints count as intersecting.
pub fn segment_intersection_t(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<f64> {
    let d1x = a2.x - a1.x;
    let d1y = a2.y - a1.y;
    let d2x = b2.x - b1.x;
    let d2y = b2.y - b1.y;

    let cross = d1x as i128 * d2y as i128 - d1y as i128 * d2x as i128;
    if cross == 0 {
        return None;
    }

    let dx = b1.x - a1.x;
    let dy = b1.y - a1.y;

    let t_num = dx as i128 * d2y as i128 - dy as i128 * d2x as i128;
    let u_num = dx as i128 * d1y as i128 - dy as i128 * d1x as i128;

    let in_range = if cross > 0 {
        (0..=cross).contains(&t_num) && (0..=cross).contains(&u_num)
    } else {
        (cross..=0).contains(&t_num) && (cross..=0).contains(&u_num)
    };
    if !in_range {
        return None;
    }
    Some(t_num as f64 / cross as f64)
}

/// Interpolate along a-b at integer distance `dist` of total `len`.
#[inline]
pub fn point_along(a: Point, b: Point, dist: Coord, len: Coord) -> Point {
    if len == 0 {
        return a;
    }
    let dx = (b.x - a.x) as i128 * dist as i128 / len as i128;
    let dy = (b.y - a.y) as i128 * dist as i128 / len as i128;
    Point::new(a.x + dx as Coord, a.y + dy as Coord)
}
