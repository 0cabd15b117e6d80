//! Directed segments and segment-splitting utilities.
//!
//! The perimeter overlap detector works on directed segments rather than
//! point sequences: a point sequence is first exploded into segments, then
//! segments running close past foreign vertices are split at the vertex
//! projections so that near-parallel runs can be matched pairwise.

use super::{point_along, Point3};
use crate::Coord;
use std::collections::BTreeSet;

/// A directed 3D segment with an extrusion width annotation.
///
/// The width is in micrometers and defaults to 0; the overlap detector
/// fills it in for merged segments. Equality is structural on the
/// endpoints only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Segment {
    pub from: Point3,
    pub to: Point3,
    pub width: Coord,
}

impl Segment {
    /// Create a new segment with width 0.
    #[inline]
    pub const fn new(from: Point3, to: Point3) -> Self {
        Self { from, to, width: 0 }
    }

    /// 2D length of this segment.
    #[inline]
    pub fn length(&self) -> Coord {
        (self.to.xy() - self.from.xy()).length()
    }
}

impl PartialEq for Segment {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl Eq for Segment {}

/// Convert a point sequence to a list of directed segments.
///
/// Produces `n` segments if `closed` (the last wraps back to the first),
/// otherwise `n - 1`. Widths are 0.
pub fn path_to_segments(points: &[Point3], closed: bool) -> Vec<Segment> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let count = if closed { n } else { n - 1 };
    (0..count)
        .map(|i| Segment::new(points[i], points[(i + 1) % n]))
        .collect()
}

/// Split a segment at the projections of foreign vertices that run close
/// past it.
///
/// A vertex contributes a split when its perpendicular distance to the
/// segment is below `max_distance` (the comparison is kept unnormalized as
/// `|perp_dot| < max_distance * length` to stay in integer arithmetic) and
/// its along-axis projection falls strictly inside the segment. Split
/// positions are collected in an ordered set keyed by along-axis distance,
/// rejecting duplicates. Returns `None` when no vertex splits the segment.
pub fn split_segment_for_vertices(
    seg: &Segment,
    vertices: &[Point3],
    max_distance: Coord,
) -> Option<Vec<Segment>> {
    let dir = seg.to.xy() - seg.from.xy();
    let len = dir.length();
    let len_sq = dir.length_squared();
    if len == 0 {
        return None;
    }

    let mut splits: BTreeSet<Coord> = BTreeSet::new();
    let perp = dir.perp_right();
    for v in vertices {
        let diff = v.xy() - seg.from.xy();
        let perp_dot = perp.dot(&diff);
        if perp_dot.abs() >= max_distance as i128 * len as i128 {
            continue;
        }
        let along = dir.dot(&diff);
        if along <= 0 || along >= len_sq {
            continue;
        }
        let dist = (along / len as i128) as Coord;
        splits.insert(dist);
    }

    if splits.is_empty() {
        return None;
    }
    splits.insert(0);
    splits.insert(len);

    let positions: Vec<Coord> = splits.into_iter().collect();
    let mut result = Vec::with_capacity(positions.len() - 1);
    for pair in positions.windows(2) {
        let a = point_along(seg.from.xy(), seg.to.xy(), pair[0], len);
        let b = point_along(seg.from.xy(), seg.to.xy(), pair[1], len);
        result.push(Segment::new(
            Point3::from_xy(a, seg.from.z),
            Point3::from_xy(b, seg.from.z),
        ));
    }
    // Snap the outer endpoints so rounding cannot detach the split run
    if let Some(first) = result.first_mut() {
        first.from = seg.from;
    }
    if let Some(last) = result.last_mut() {
        last.to = seg.to;
    }
    Some(result)
}

/// Insert virtual vertices into a closed perimeter so that near-parallel
/// segment pairs can be matched one to one.
///
/// Walks the perimeter's segments in reverse order, splitting each at the
/// projections of the perimeter's own vertices within `distance`, and
/// returns the concatenated start points of the resulting segments.
pub fn make_close_segments_mergeable(perimeter: &[Point3], distance: Coord) -> Vec<Point3> {
    let mut segments = path_to_segments(perimeter, true);
    for i in (0..segments.len()).rev() {
        if let Some(subs) = split_segment_for_vertices(&segments[i], perimeter, distance) {
            segments.splice(i..i + 1, subs);
        }
    }
    segments.into_iter().map(|s| s.from).collect()
}
