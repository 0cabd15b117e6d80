//! Polygon offsetting via the geo-clipper library.
//!
//! The planner itself never runs boolean operations; the only clipping it
//! needs is insetting closed boundaries, used to derive a comb boundary a
//! little inside the part's outer walls. Conversions go through geo's f64
//! millimeter types and back to integer micrometers.

use crate::geometry::{Point, Polygon, Polygons};
use crate::{scale, unscale, CoordF};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Join type for offset corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoinType {
    /// Square corners
    Square,
    /// Round corners
    Round,
    /// Mitered corners
    #[default]
    Miter,
}

impl From<OffsetJoinType> for JoinType {
    fn from(jt: OffsetJoinType) -> Self {
        match jt {
            OffsetJoinType::Square => JoinType::Square,
            OffsetJoinType::Round => JoinType::Round(0.25),
            OffsetJoinType::Miter => JoinType::Miter(2.0),
        }
    }
}

/// Convert a planner polygon to geo's polygon type (closing the ring).
fn polygon_to_geo(poly: &Polygon) -> GeoPolygon<f64> {
    let mut ring: Vec<GeoCoord<f64>> = poly
        .points()
        .iter()
        .map(|p| GeoCoord {
            x: unscale(p.x),
            y: unscale(p.y),
        })
        .collect();

    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first != last {
            ring.push(*first);
        }
    }

    GeoPolygon::new(LineString::new(ring), vec![])
}

/// Convert one geo polygon (exterior and holes) back to planner polygons.
///
/// Holes come back as separate rings; the even-odd containment the planner
/// uses treats them correctly without an explicit holes structure.
fn geo_to_polygons(geo_poly: &GeoPolygon<f64>) -> Polygons {
    let ring_to_polygon = |ring: &LineString<f64>| {
        let mut points: Vec<Point> = ring
            .coords()
            .map(|c| Point::new(scale(c.x), scale(c.y)))
            .collect();
        // geo rings repeat the first point at the end
        if points.len() >= 2 && points.first() == points.last() {
            points.pop();
        }
        Polygon::from_points(points)
    };

    let mut out = vec![ring_to_polygon(geo_poly.exterior())];
    out.extend(geo_poly.interiors().iter().map(ring_to_polygon));
    out.retain(|p| p.len() >= 3);
    out
}

fn geo_multi_to_polygons(multi: &MultiPolygon<f64>) -> Polygons {
    multi.0.iter().flat_map(geo_to_polygons).collect()
}

/// Offset polygons by a given distance in mm.
///
/// Positive delta inflates (grows) the polygons, negative delta deflates
/// (shrinks) them.
pub fn offset_polygons(polygons: &[Polygon], delta: CoordF, join_type: OffsetJoinType) -> Polygons {
    if polygons.is_empty() {
        return Vec::new();
    }

    let geo_multi = MultiPolygon::new(polygons.iter().map(polygon_to_geo).collect());
    let jt = join_type.into();

    let result = geo_multi.offset(delta, jt, EndType::ClosedPolygon, 1000.0);
    geo_multi_to_polygons(&result)
}

/// Shrink (inset) polygons by a given distance in mm.
pub fn shrink(polygons: &[Polygon], distance: CoordF, join_type: OffsetJoinType) -> Polygons {
    offset_polygons(polygons, -distance.abs(), join_type)
}
