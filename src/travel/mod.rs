//! Travel routing inside the part's outer walls.
//!
//! Travels that leave the printed part can ooze onto visible surfaces. The
//! planner therefore consults a crossing-avoidance oracle before every
//! travel: if the move can be routed so that it stays inside a designated
//! boundary (the outer walls, usually inset a little), no retraction is
//! needed unless the route is long; if it cannot, the travel crosses the
//! boundary and retracts when long enough.
//!
//! [`CrossingAvoidance`] is the capability interface the planner consumes;
//! [`AvoidCrossingPerimeters`] is the concrete oracle over polygon
//! boundaries. Its routing is deliberately simple: a straight move that
//! crosses no boundary edge passes through unchanged, and a move that
//! leaves a single concave polygon detours along the shorter side of the
//! boundary vertex chain, with each waypoint nudged off the wall.

use crate::clipper::{self, OffsetJoinType};
use crate::geometry::{segment_intersection_t, Point, Polygon, Polygons};
use crate::{unscale, Coord};
use log::debug;

/// How far detour waypoints are pushed off the boundary (µm).
const WAYPOINT_INSIDE_OFFSET: Coord = 200;

/// Boundary-interior travel oracle.
pub trait CrossingAvoidance {
    /// Whether `p` lies inside the boundary.
    fn point_is_inside(&self, p: Point) -> bool;

    /// Best-effort projection of `p` to a point about `distance` inside
    /// the boundary. `None` when there is no boundary to project onto; a
    /// returned point is not guaranteed to be inside (tight corners can
    /// land the projection on the wrong side).
    fn move_point_inside(&self, p: Point, distance: Coord) -> Option<Point>;

    /// A piecewise-linear route from `from` to `to` that stays inside the
    /// boundary, as intermediate waypoints only (empty when the straight
    /// move already stays inside). `None` when no interior route exists.
    fn create_path_inside(&self, from: Point, to: Point) -> Option<Vec<Point>>;
}

/// Concrete crossing-avoidance oracle over polygon boundaries.
pub struct AvoidCrossingPerimeters {
    boundary: Polygons,
}

impl AvoidCrossingPerimeters {
    /// Create an oracle over an already-computed boundary.
    pub fn new(boundary: Polygons) -> Self {
        Self { boundary }
    }

    /// Derive the travel boundary from outer wall polygons by insetting
    /// them `inset` µm.
    pub fn from_outer_walls(walls: &[Polygon], inset: Coord) -> Self {
        let boundary = clipper::shrink(walls, unscale(inset), OffsetJoinType::Miter);
        debug!(
            "travel boundary: {} wall polygons inset to {} boundary polygons",
            walls.len(),
            boundary.len()
        );
        Self::new(boundary)
    }

    /// The boundary polygons.
    pub fn boundary(&self) -> &[Polygon] {
        &self.boundary
    }

    /// Unnormalized inward edge normal for segment `seg` of `poly`.
    fn inward_normal(poly: &Polygon, seg: usize) -> Point {
        let n = poly.len();
        let d = poly[(seg + 1) % n] - poly[seg];
        if poly.is_ccw() {
            Point::new(-d.y, d.x)
        } else {
            d.perp_right()
        }
    }

    /// Vertex `k` of `poly`, nudged inside along its angle bisector.
    fn vertex_nudged_inside(poly: &Polygon, k: usize) -> Point {
        let n = poly.len();
        let before = Self::inward_normal(poly, (k + n - 1) % n).normal(1_000);
        let after = Self::inward_normal(poly, k).normal(1_000);
        poly[k] + (before + after).normal(WAYPOINT_INSIDE_OFFSET)
    }

    /// Vertex indices passed when walking the boundary from a crossing on
    /// segment `s0` to a crossing on segment `s1`.
    fn chain(s0: usize, s1: usize, n: usize, forward: bool) -> Vec<usize> {
        let mut out = Vec::new();
        if forward {
            let mut k = (s0 + 1) % n;
            loop {
                out.push(k);
                if k == s1 {
                    break;
                }
                k = (k + 1) % n;
                if out.len() > n {
                    break;
                }
            }
        } else {
            let mut k = s0;
            loop {
                out.push(k);
                if k == (s1 + 1) % n {
                    break;
                }
                k = (k + n - 1) % n;
                if out.len() > n {
                    break;
                }
            }
        }
        out
    }

    fn chain_length(poly: &Polygon, exit: Point, entry: Point, chain: &[usize]) -> Coord {
        let mut length = 0;
        let mut prev = exit;
        for &k in chain {
            length += (poly[k] - prev).length();
            prev = poly[k];
        }
        length + (entry - prev).length()
    }
}

impl CrossingAvoidance for AvoidCrossingPerimeters {
    fn point_is_inside(&self, p: Point) -> bool {
        // Even-odd across all boundary polygons, so a hole ring flips a
        // containing outline back to outside
        self.boundary
            .iter()
            .filter(|poly| poly.contains_point(&p))
            .count()
            % 2
            == 1
    }

    fn move_point_inside(&self, p: Point, distance: Coord) -> Option<Point> {
        let mut best: Option<(Point, usize, usize)> = None;
        let mut best_dist = i128::MAX;
        for (pi, poly) in self.boundary.iter().enumerate() {
            if let Some((q, seg)) = poly.closest_boundary_point(&p) {
                let d = p.distance_squared(&q);
                if d < best_dist {
                    best_dist = d;
                    best = Some((q, pi, seg));
                }
            }
        }
        let (q, pi, seg) = best?;

        // Step off the closest edge along its inward normal. When the
        // projection clamps to a corner this can still land outside; a
        // repeated call projects onto the adjacent edge and recovers.
        let inward = Self::inward_normal(&self.boundary[pi], seg);
        Some(q + inward.normal(distance))
    }

    fn create_path_inside(&self, from: Point, to: Point) -> Option<Vec<Point>> {
        if !self.point_is_inside(from) || !self.point_is_inside(to) {
            return None;
        }

        let mut crossings: Vec<(f64, usize, usize)> = Vec::new();
        for (pi, poly) in self.boundary.iter().enumerate() {
            for (si, (a, b)) in poly.segments().enumerate() {
                if let Some(t) = segment_intersection_t(from, to, a, b) {
                    crossings.push((t, pi, si));
                }
            }
        }

        if crossings.is_empty() {
            return Some(Vec::new());
        }

        // Routing around more than one polygon, or through a tangential
        // odd crossing, is not attempted
        let pi = crossings[0].1;
        if crossings.iter().any(|c| c.1 != pi) || crossings.len() % 2 != 0 {
            return None;
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let poly = &self.boundary[pi];
        let n = poly.len();
        let delta = to - from;
        let line_point = |t: f64| {
            Point::new(
                from.x + (delta.x as f64 * t).round() as Coord,
                from.y + (delta.y as f64 * t).round() as Coord,
            )
        };

        let mut route = Vec::new();
        for pair in crossings.chunks(2) {
            let (t0, _, s0) = pair[0];
            let (t1, _, s1) = pair[1];
            let exit = line_point(t0);
            let entry = line_point(t1);

            let forward = Self::chain(s0, s1, n, true);
            let backward = Self::chain(s0, s1, n, false);
            let chain = if Self::chain_length(poly, exit, entry, &forward)
                <= Self::chain_length(poly, exit, entry, &backward)
            {
                forward
            } else {
                backward
            };
            route.extend(chain.iter().map(|&k| Self::vertex_nudged_inside(poly, k)));
        }
        Some(route)
    }
}
