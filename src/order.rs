//! Polygon visit-order optimization.
//!
//! Uses a nearest-neighbor greedy heuristic: from the current head
//! position, the next polygon is the one whose closest vertex is nearest,
//! and that vertex becomes its start index. After a closed loop the head
//! is back at the start vertex, so the search continues from there.

use crate::geometry::{Point, Polygon};

/// Greedy nearest-vertex ordering of polygons.
pub struct IslandOrderOptimizer {
    start: Point,
}

impl IslandOrderOptimizer {
    /// Create an optimizer starting from the given head position.
    pub fn new(start: Point) -> Self {
        Self { start }
    }

    /// The vertex of `polygon` closest to `p`, by squared distance.
    fn closest_vertex(polygon: &Polygon, p: Point) -> Option<(usize, i128)> {
        polygon
            .points()
            .iter()
            .enumerate()
            .map(|(i, v)| (i, p.distance_squared(v)))
            .min_by_key(|&(_, d)| d)
    }

    /// Visit order as `(polygon index, start vertex index)` pairs. Empty
    /// polygons are skipped.
    pub fn optimize(&self, polygons: &[Polygon]) -> Vec<(usize, usize)> {
        let mut visited = vec![false; polygons.len()];
        let mut order = Vec::with_capacity(polygons.len());
        let mut position = self.start;

        loop {
            let mut best: Option<(usize, usize, i128)> = None;
            for (i, polygon) in polygons.iter().enumerate() {
                if visited[i] {
                    continue;
                }
                let Some((vertex, dist)) = Self::closest_vertex(polygon, position) else {
                    visited[i] = true;
                    continue;
                };
                if best.map_or(true, |(_, _, d)| dist < d) {
                    best = Some((i, vertex, dist));
                }
            }
            let Some((i, vertex, _)) = best else {
                break;
            };
            visited[i] = true;
            order.push((i, vertex));
            position = polygons[i][vertex];
        }
        order
    }
}
