//! The layer toolpath planner.
//!
//! [`GCodePlanner`] buffers one layer's worth of travel and extrusion moves
//! as [`GCodePath`] records grouped by path config, so that layer-wide
//! passes (minimum layer time, spiral lift, overlap merging) can still
//! rewrite them before anything reaches the writer. A single call to
//! [`GCodePlanner::write_queued`] walks the buffer once and emits motion
//! through a [`CodeWriter`].
//!
//! # Queuing
//!
//! Moves append to the tail path while it matches the requested config and
//! extruder and has not been closed with `force_new_path_start`; otherwise
//! a fresh path opens. Travels decide their own retraction: a forced
//! retraction wins, then the crossing-avoidance oracle (retract only when
//! the in-boundary route is long, or when no interior route exists and the
//! straight move is long), then the always-retract policy.
//!
//! # Emission
//!
//! The flushing walk applies, in order: extruder switches (which supersede
//! retractions), per-feature type comments and bridge fan overrides, speed
//! factors (bridges keep nominal speed), small-move coalescing, spiral Z
//! interpolation, optional perimeter overlap merging, and wall endpoint
//! trimming.

use crate::config::{PathConfig, PathConfigId};
use crate::gcode::overlap::remove_perimeter_overlaps;
use crate::gcode::writer::CodeWriter;
use crate::geometry::{midpoint3, Point, Point3, Polygon};
use crate::order::IslandOrderOptimizer;
use crate::travel::{AvoidCrossingPerimeters, CrossingAvoidance};
use crate::{Coord, CoordF, Result};
use log::debug;

/// One sequential block of points sharing a config and extruder.
#[derive(Debug, Clone)]
pub struct GCodePath {
    /// Interned config of every move in this path.
    pub config: PathConfigId,
    /// Extruder that prints this path.
    pub extruder: usize,
    /// Retract before the first motion of this path.
    pub retract: bool,
    /// The queued points. Z equals the planner's layer z at queue time;
    /// spiralize paths get their z rewritten during emission.
    pub points: Vec<Point3>,
    /// A done path takes no further appends.
    pub done: bool,
}

/// Buffered toolpath planner for a single layer.
pub struct GCodePlanner {
    configs: Vec<PathConfig>,
    paths: Vec<GCodePath>,
    /// Head XY at construction, where the layer's first move starts.
    start_position: Point,
    /// Logical head XY after the last queued move.
    last_position: Point,
    current_z: Coord,
    current_extruder: usize,
    force_retraction: bool,
    always_retract: bool,
    /// Integer percent, minimum 1.
    extrude_speed_factor: i64,
    /// Integer percent, minimum 1.
    travel_speed_factor: i64,
    /// Travels shorter than this never trigger retraction (µm).
    retraction_min_distance: Coord,
    total_print_time: f64,
    extra_time: f64,
    avoidance: Option<Box<dyn CrossingAvoidance>>,
    merge_overlapping_walls: bool,
}

impl GCodePlanner {
    /// Id of the built-in travel config.
    pub const TRAVEL_CONFIG: PathConfigId = PathConfigId(0);

    /// Create a planner for one layer.
    ///
    /// Snapshots the writer's position and z; the writer itself is only
    /// borrowed again by [`write_queued`](Self::write_queued).
    pub fn new(
        writer: &dyn CodeWriter,
        travel_speed: CoordF,
        retraction_min_distance: Coord,
    ) -> Self {
        Self {
            configs: vec![PathConfig::travel(travel_speed)],
            paths: Vec::new(),
            start_position: writer.position_2d(),
            last_position: writer.position_2d(),
            current_z: writer.position_z(),
            current_extruder: writer.current_extruder(),
            force_retraction: false,
            always_retract: false,
            extrude_speed_factor: 100,
            travel_speed_factor: 100,
            retraction_min_distance,
            total_print_time: 0.0,
            extra_time: 0.0,
            avoidance: None,
            merge_overlapping_walls: false,
        }
    }

    /// Intern a path config, returning its id.
    pub fn add_config(&mut self, config: PathConfig) -> PathConfigId {
        self.configs.push(config);
        PathConfigId(self.configs.len() - 1)
    }

    /// Look up an interned config.
    #[inline]
    pub fn config(&self, id: PathConfigId) -> &PathConfig {
        &self.configs[id.0]
    }

    /// The queued paths.
    pub fn paths(&self) -> &[GCodePath] {
        &self.paths
    }

    /// Logical head XY after the last queued move.
    pub fn last_position(&self) -> Point {
        self.last_position
    }

    /// Select the extruder for subsequently queued paths.
    /// Returns true iff the extruder changed.
    pub fn set_extruder(&mut self, extruder: usize) -> bool {
        if extruder == self.current_extruder {
            return false;
        }
        self.current_extruder = extruder;
        true
    }

    /// Extruder for subsequently queued paths.
    pub fn extruder(&self) -> usize {
        self.current_extruder
    }

    /// Make the next queued travel retract.
    pub fn force_retract(&mut self) {
        self.force_retraction = true;
    }

    /// Retract on every sufficiently long travel, regardless of boundary
    /// crossing.
    pub fn set_always_retract(&mut self, always_retract: bool) {
        self.always_retract = always_retract;
    }

    /// Scale all extrusion speeds by an integer percent (clamped to ≥ 1).
    pub fn set_extrude_speed_factor(&mut self, factor_pct: i64) {
        self.extrude_speed_factor = factor_pct.max(1);
    }

    /// Current extrusion speed factor (percent).
    pub fn extrude_speed_factor(&self) -> i64 {
        self.extrude_speed_factor
    }

    /// Scale all travel speeds by an integer percent (clamped to ≥ 1).
    pub fn set_travel_speed_factor(&mut self, factor_pct: i64) {
        self.travel_speed_factor = factor_pct.max(1);
    }

    /// Current travel speed factor (percent).
    pub fn travel_speed_factor(&self) -> i64 {
        self.travel_speed_factor
    }

    /// Install (or clear) the travel boundary: travels are routed inside
    /// these polygons where possible.
    pub fn set_outer_perimeters_to_avoid(&mut self, polygons: Option<Vec<Polygon>>) {
        self.avoidance = polygons
            .map(|p| Box::new(AvoidCrossingPerimeters::new(p)) as Box<dyn CrossingAvoidance>);
    }

    /// Install a custom crossing-avoidance oracle.
    pub fn set_avoidance(&mut self, avoidance: Option<Box<dyn CrossingAvoidance>>) {
        self.avoidance = avoidance;
    }

    /// Rewrite self-overlapping wall stretches as single wider extrusions
    /// during emission. Off by default.
    pub fn set_merge_overlapping_walls(&mut self, merge: bool) {
        self.merge_overlapping_walls = merge;
    }

    /// Close the tail path so the next queued move starts a fresh path
    /// with an independent retraction decision.
    pub fn force_new_path_start(&mut self) {
        if let Some(last) = self.paths.last_mut() {
            last.done = true;
        }
    }

    /// The tail path if it still accepts moves of `config`, else a fresh
    /// path for it.
    fn latest_path_with_config(&mut self, config: PathConfigId) -> &mut GCodePath {
        let appendable = matches!(
            self.paths.last(),
            Some(p) if p.config == config && !p.done && p.extruder == self.current_extruder
        );
        if !appendable {
            self.paths.push(GCodePath {
                config,
                extruder: self.current_extruder,
                retract: false,
                points: Vec::new(),
                done: false,
            });
        }
        let tail = self.paths.len() - 1;
        &mut self.paths[tail]
    }

    /// Queue an extrusion move to `dest`.
    pub fn queue_extrusion(&mut self, dest: Point, config: PathConfigId) {
        let z = self.current_z;
        let path = self.latest_path_with_config(config);
        path.points.push(Point3::from_xy(dest, z));
        self.last_position = dest;
    }

    /// Queue a travel move to `dest`, routing inside the installed
    /// boundary where possible and deciding retraction.
    pub fn queue_travel(&mut self, dest: Point) {
        let last = self.last_position;
        let mut retract = false;
        let mut route: Vec<Point> = Vec::new();

        if self.force_retraction {
            retract = true;
            self.force_retraction = false;
        } else if let Some(avoid) = self.avoidance.as_deref() {
            if let Some(inside) = avoid.create_path_inside(last, dest) {
                route = inside;
                let mut distance: Coord = 0;
                let mut prev = last;
                for p in &route {
                    distance += (*p - prev).length();
                    prev = *p;
                }
                distance += (dest - prev).length();
                if distance > self.retraction_min_distance {
                    retract = true;
                }
            } else {
                // No interior route: the move crosses the boundary
                retract = (dest - last).longer_than(self.retraction_min_distance);
            }
        } else if self.always_retract {
            retract = (dest - last).longer_than(self.retraction_min_distance);
        }

        let z = self.current_z;
        let path = self.latest_path_with_config(Self::TRAVEL_CONFIG);
        if retract {
            path.retract = true;
        }
        for p in route {
            path.points.push(Point3::from_xy(p, z));
        }
        path.points.push(Point3::from_xy(dest, z));
        self.last_position = dest;
    }

    /// Queue a polygon starting (and, for closed-loop configs, ending) at
    /// `start_index`.
    ///
    /// Open paths queued at `start_index` 0 run forward; any other start
    /// index runs them backward.
    pub fn queue_polygon(&mut self, polygon: &Polygon, start_index: usize, config: PathConfigId) {
        let n = polygon.len();
        let (spiralize, closed_loop) = {
            let cfg = self.config(config);
            (cfg.spiralize, cfg.closed_loop)
        };

        if !spiralize && self.last_position != polygon[start_index] {
            self.queue_travel(polygon[start_index]);
        }

        if closed_loop {
            for i in 1..n {
                self.queue_extrusion(polygon[(start_index + i) % n], config);
            }
            if n > 2 {
                self.queue_extrusion(polygon[start_index], config);
            }
        } else if start_index == 0 {
            for i in 1..n {
                self.queue_extrusion(polygon[i], config);
            }
        } else {
            for i in (1..n).rev() {
                self.queue_extrusion(polygon[(start_index + i) % n], config);
            }
        }
    }

    /// Queue several polygons in the order (and at the start vertices) the
    /// island optimizer picks.
    pub fn queue_polygons_by_optimizer(&mut self, polygons: &[Polygon], config: PathConfigId) {
        let optimizer = IslandOrderOptimizer::new(self.last_position);
        for (index, start) in optimizer.optimize(polygons) {
            self.queue_polygon(&polygons[index], start, config);
        }
    }

    /// If the head sits outside the travel boundary, travel to a point
    /// `distance` inside it and close the path, so a following travel's
    /// retraction happens after the move inside rather than before it.
    pub fn move_inside_the_outer_perimeter(&mut self, distance: Coord) {
        let target = {
            let Some(avoid) = self.avoidance.as_deref() else {
                return;
            };
            if avoid.point_is_inside(self.last_position) {
                return;
            }
            let mut p = self.last_position;
            // Both projections are best-effort; the second resolves tight
            // corners where the first lands on the wrong side.
            p = avoid.move_point_inside(p, distance).unwrap_or(p);
            p = avoid.move_point_inside(p, distance).unwrap_or(p);
            if !avoid.point_is_inside(p) {
                return;
            }
            p
        };
        self.queue_travel(target);
        self.force_new_path_start();
    }

    /// Estimated print time of the queued paths (seconds), valid after
    /// [`force_minimum_layer_time`](Self::force_minimum_layer_time).
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time
    }

    /// Slack left under the minimum layer time that slowing down could not
    /// absorb (seconds).
    pub fn extra_time(&self) -> f64 {
        self.extra_time
    }

    /// Slow extrusion down so this layer takes at least `min_time`
    /// seconds, without pushing any extrusion path below `minimum_speed`.
    ///
    /// The factor only ever decreases across calls within a layer; a
    /// first-layer slowdown already in effect is never sped back up. The
    /// minimum-speed floor is folded in uniformly over all extrusion paths
    /// before the factor is applied.
    pub fn force_minimum_layer_time(&mut self, min_time: f64, minimum_speed: CoordF) {
        let mut travel_time = 0.0;
        let mut extrude_time = 0.0;
        let mut p0 = self.start_position;
        for path in &self.paths {
            let cfg = &self.configs[path.config.0];
            for point in &path.points {
                let t = (point.xy() - p0).length_mm() / cfg.speed;
                if cfg.is_extruding() {
                    extrude_time += t;
                } else {
                    travel_time += t;
                }
                p0 = point.xy();
            }
        }

        let total = extrude_time + travel_time;
        if total < min_time && extrude_time > 0.0 {
            let min_extrude_time = (min_time - travel_time).max(1.0);
            let mut factor = extrude_time / min_extrude_time;
            for path in &self.paths {
                let cfg = &self.configs[path.config.0];
                if !cfg.is_extruding() {
                    continue;
                }
                let floor = (minimum_speed / cfg.speed).min(1.0);
                if factor < floor {
                    factor = floor;
                }
            }

            let candidate = ((factor * 100.0).round() as i64).max(1);
            if candidate < self.extrude_speed_factor {
                self.extrude_speed_factor = candidate;
                debug!(
                    "layer below minimum time ({:.2}s < {:.2}s): extrusion slowed to {}%",
                    total, min_time, candidate
                );
            }

            let effective = self.extrude_speed_factor as f64 / 100.0;
            let slowed = extrude_time / effective;
            self.extra_time = (min_time - slowed - travel_time).max(0.0);
            self.total_print_time = slowed + travel_time;
        } else {
            self.extra_time = 0.0;
            self.total_print_time = total;
        }
    }

    /// Flush every queued path through the writer.
    ///
    /// `layer_thickness` (µm) drives spiral Z interpolation; `fan_speed`
    /// and `bridge_fan_speed` are duty percents, negative meaning "no
    /// override".
    pub fn write_queued(
        &mut self,
        writer: &mut dyn CodeWriter,
        layer_thickness: Coord,
        fan_speed: i64,
        bridge_fan_speed: i64,
    ) -> Result<()> {
        let mut last_config: Option<PathConfigId> = None;
        let mut extruder = writer.current_extruder();

        let mut n = 0;
        while n < self.paths.len() {
            let config_id = self.paths[n].config;
            let cfg = self.configs[config_id.0];
            let is_travel = config_id == Self::TRAVEL_CONFIG;

            // An extruder switch supersedes the path's own retraction.
            if self.paths[n].extruder != extruder {
                extruder = self.paths[n].extruder;
                writer.switch_extruder(extruder)?;
            } else if self.paths[n].retract {
                writer.retract()?;
            }

            if !is_travel && last_config != Some(config_id) {
                if cfg.kind.is_bridge() && bridge_fan_speed >= 0 {
                    writer.fan(bridge_fan_speed)?;
                } else if bridge_fan_speed >= 0
                    && last_config.is_some_and(|id| self.configs[id.0].kind.is_bridge())
                {
                    writer.fan(fan_speed)?;
                }
                writer.comment(&format!("TYPE:{}", cfg.kind.tag()))?;
                last_config = Some(config_id);
            }

            let mut speed = cfg.speed;
            if is_travel {
                speed = speed * self.travel_speed_factor as f64 / 100.0;
            } else if !cfg.kind.is_bridge() {
                // Cooling slowdowns never apply to bridges
                speed = speed * self.extrude_speed_factor as f64 / 100.0;
            }

            // Coalesce a run of small moves into fewer, wider segments
            if !is_travel
                && self.paths[n].points.len() == 1
                && (self.paths[n].points[0].xy() - writer.position_2d())
                    .shorter_than(cfg.line_width * 2)
            {
                let mut next_position = self.paths[n].points[0].xy();
                let mut i = n + 1;
                while i < self.paths.len()
                    && self.paths[i].points.len() == 1
                    && (self.paths[i].points[0].xy() - next_position)
                        .shorter_than(cfg.line_width * 2)
                {
                    next_position = self.paths[i].points[0].xy();
                    i += 1;
                }
                // Leave a trailing travel to be emitted normally
                if self.paths[i - 1].config == Self::TRAVEL_CONFIG {
                    i -= 1;
                }
                if i > n + 2 {
                    let mut run_end = writer.position_2d();
                    let mut x = n;
                    while x + 1 < i {
                        let first = self.paths[x].points[0];
                        let second = self.paths[x + 1].points[0];
                        let old_len = (first.xy() - run_end).length();
                        let merged = midpoint3(first, second);
                        let new_len = (merged.xy() - writer.position_2d()).length();
                        if new_len > 0 {
                            let width = cfg.line_width * old_len / new_len;
                            writer.write_move(merged, speed, width)?;
                        }
                        run_end = second.xy();
                        x += 2;
                    }
                    writer.write_move(self.paths[i - 1].points[0], speed, cfg.line_width)?;
                    n = i;
                    continue;
                }
            }

            // Spiral lift applies only to the outermost single spiral
            let mut spiralize = cfg.spiralize;
            if spiralize
                && self.paths[n + 1..]
                    .iter()
                    .any(|p| self.configs[p.config.0].spiralize)
            {
                spiralize = false;
            }
            if spiralize {
                let mut total_length: Coord = 0;
                let mut p0 = writer.position_2d();
                for point in &self.paths[n].points {
                    total_length += (point.xy() - p0).length();
                    p0 = point.xy();
                }

                let z_base = writer.position_z();
                let mut length: Coord = 0;
                p0 = writer.position_2d();
                for point in &self.paths[n].points {
                    length += (point.xy() - p0).length();
                    p0 = point.xy();
                    let z = if total_length > 0 {
                        z_base
                            + (layer_thickness as i128 * length as i128 / total_length as i128)
                                as Coord
                    } else {
                        z_base
                    };
                    writer.write_move(Point3::new(point.x, point.y, z), speed, cfg.line_width)?;
                }
                n += 1;
                continue;
            }

            // A completed wall loop may be rewritten as overlap-merged
            // fragments of varying width
            if self.merge_overlapping_walls
                && cfg.is_extruding()
                && self.paths[n].points.len() > 2
                && self.paths[n]
                    .points
                    .last()
                    .is_some_and(|p| p.xy() == writer.position_2d())
            {
                let (changed, fragments) =
                    remove_perimeter_overlaps(&self.paths[n].points, cfg.line_width);
                if changed {
                    for fragment in fragments.iter().filter(|f| !f.points.is_empty()) {
                        writer.write_move(fragment.points[0], speed, 0)?;
                        for point in &fragment.points[1..] {
                            writer.write_move(*point, speed, fragment.extrusion_width)?;
                        }
                    }
                    n += 1;
                    continue;
                }
            }

            if cfg.kind.is_wall() {
                trim_wall_endpoint(&mut self.paths[n].points, cfg.line_width);
            }
            for point in &self.paths[n].points {
                writer.write_move(*point, speed, cfg.line_width)?;
            }
            n += 1;
        }

        writer.update_total_print_time();
        Ok(())
    }
}

/// Shorten a wall path's tail by 90% of one line width, so the loop seam
/// overlaps the start instead of leaving a gap.
fn trim_wall_endpoint(points: &mut Vec<Point3>, line_width: Coord) {
    let mut target = line_width * 9 / 10;
    while points.len() >= 2 {
        let i = points.len() - 1;
        let tail = points[i].xy();
        let prev = points[i - 1].xy();
        let d = (tail - prev).length();
        if d > target {
            let remaining = d - target;
            // Do not bother below truncation-error scale
            if remaining > 100 {
                let new_xy = prev + (tail - prev).normal(remaining);
                points[i] = Point3::from_xy(new_xy, points[i].z);
            }
            return;
        }
        if d == target {
            points.pop();
            return;
        }
        points.pop();
        target -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathKind;

    /// Writer double that records emitted events and tracks position.
    struct RecordingWriter {
        position: Point3,
        extruder: usize,
        events: Vec<Event>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Move {
            p: Point3,
            speed: CoordF,
            width: Coord,
        },
        Retract,
        Switch(usize),
        Fan(i64),
        Comment(String),
    }

    impl RecordingWriter {
        fn new() -> Self {
            Self {
                position: Point3::new(0, 0, 0),
                extruder: 0,
                events: Vec::new(),
            }
        }

        fn moves(&self) -> Vec<(Point3, CoordF, Coord)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Move { p, speed, width } => Some((*p, *speed, *width)),
                    _ => None,
                })
                .collect()
        }
    }

    impl CodeWriter for RecordingWriter {
        fn position_z(&self) -> Coord {
            self.position.z
        }

        fn position_2d(&self) -> Point {
            self.position.xy()
        }

        fn position_3d(&self) -> Point3 {
            self.position
        }

        fn current_extruder(&self) -> usize {
            self.extruder
        }

        fn switch_extruder(&mut self, extruder: usize) -> Result<()> {
            self.extruder = extruder;
            self.events.push(Event::Switch(extruder));
            Ok(())
        }

        fn retract(&mut self) -> Result<()> {
            self.events.push(Event::Retract);
            Ok(())
        }

        fn fan(&mut self, pct: i64) -> Result<()> {
            self.events.push(Event::Fan(pct));
            Ok(())
        }

        fn comment(&mut self, text: &str) -> Result<()> {
            self.events.push(Event::Comment(text.to_string()));
            Ok(())
        }

        fn write_move(&mut self, p: Point3, speed: CoordF, line_width: Coord) -> Result<()> {
            if p == self.position {
                return Ok(());
            }
            self.position = p;
            self.events.push(Event::Move {
                p,
                speed,
                width: line_width,
            });
            Ok(())
        }

        fn update_total_print_time(&mut self) {}
    }

    fn planner(writer: &RecordingWriter) -> GCodePlanner {
        GCodePlanner::new(writer, 150.0, 1_000)
    }

    fn wall_config(plan: &mut GCodePlanner) -> PathConfigId {
        plan.add_config(PathConfig::new(PathKind::WallOuter, 50.0, 400))
    }

    fn square(size: Coord) -> Polygon {
        Polygon::rectangle(Point::new(0, 0), Point::new(size, size))
    }

    #[test]
    fn test_extrusions_group_by_config() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(1_000, 0), wall);
        plan.queue_extrusion(Point::new(2_000, 0), wall);
        assert_eq!(plan.paths().len(), 1);
        assert_eq!(plan.paths()[0].points.len(), 2);
        assert_eq!(plan.last_position(), Point::new(2_000, 0));
    }

    #[test]
    fn test_same_values_different_ids_split_paths() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let a = wall_config(&mut plan);
        let b = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(1_000, 0), a);
        plan.queue_extrusion(Point::new(2_000, 0), b);
        assert_eq!(plan.paths().len(), 2);
    }

    #[test]
    fn test_extruder_change_splits_paths() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(1_000, 0), wall);
        assert!(plan.set_extruder(1));
        assert!(!plan.set_extruder(1));
        plan.queue_extrusion(Point::new(2_000, 0), wall);
        assert_eq!(plan.paths().len(), 2);
        assert_eq!(plan.paths()[1].extruder, 1);
    }

    #[test]
    fn test_force_new_path_start() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(1_000, 0), wall);
        plan.force_new_path_start();
        plan.queue_extrusion(Point::new(2_000, 0), wall);
        assert_eq!(plan.paths().len(), 2);
        assert!(plan.paths()[0].done);
    }

    #[test]
    fn test_travel_always_retract_over_threshold() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.set_always_retract(true);
        plan.queue_travel(Point::new(5_000, 0));
        assert_eq!(plan.paths().len(), 1);
        assert!(plan.paths()[0].retract);
    }

    #[test]
    fn test_travel_short_move_never_retracts() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.set_always_retract(true);
        plan.queue_travel(Point::new(500, 0));
        assert!(!plan.paths()[0].retract);
    }

    #[test]
    fn test_travel_no_policy_no_retract() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.queue_travel(Point::new(50_000, 0));
        assert!(!plan.paths()[0].retract);
    }

    #[test]
    fn test_force_retract_consumed_by_next_travel() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.force_retract();
        plan.queue_travel(Point::new(500, 0));
        assert!(plan.paths()[0].retract);
        plan.force_new_path_start();
        plan.queue_travel(Point::new(600, 0));
        assert!(!plan.paths()[1].retract);
    }

    #[test]
    fn test_travel_routes_inside_boundary() {
        // A U-shaped boundary: the straight line between the two arms
        // leaves the polygon, so the route detours via boundary vertices.
        let u = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(30_000, 0),
            Point::new(30_000, 30_000),
            Point::new(20_000, 30_000),
            Point::new(20_000, 10_000),
            Point::new(10_000, 10_000),
            Point::new(10_000, 30_000),
            Point::new(0, 30_000),
        ]);
        let mut w = RecordingWriter::new();
        w.position = Point3::new(5_000, 25_000, 0);
        let mut plan = planner(&w);
        plan.set_outer_perimeters_to_avoid(Some(vec![u]));
        plan.queue_travel(Point::new(25_000, 25_000));
        // More than just the destination was queued
        assert!(plan.paths()[0].points.len() > 1);
        // And the long in-boundary route retracts
        assert!(plan.paths()[0].retract);
    }

    #[test]
    fn test_move_inside_the_outer_perimeter() {
        let mut w = RecordingWriter::new();
        w.position = Point3::new(5_000, -2_000, 0);
        let mut plan = planner(&w);
        plan.set_outer_perimeters_to_avoid(Some(vec![square(10_000)]));
        plan.move_inside_the_outer_perimeter(300);

        // One travel path, closed so the next travel retract lands after it
        assert_eq!(plan.paths().len(), 1);
        assert!(plan.paths()[0].done);
        // The head crossed the boundary on the way in
        assert!(plan.paths()[0].retract);
        assert_eq!(plan.last_position(), Point::new(5_000, 300));
    }

    #[test]
    fn test_move_inside_is_noop_when_already_inside() {
        let mut w = RecordingWriter::new();
        w.position = Point3::new(5_000, 5_000, 0);
        let mut plan = planner(&w);
        plan.set_outer_perimeters_to_avoid(Some(vec![square(10_000)]));
        plan.move_inside_the_outer_perimeter(300);
        assert!(plan.paths().is_empty());
    }

    #[test]
    fn test_queue_polygon_closed_loop() {
        let mut w = RecordingWriter::new();
        w.position = Point3::new(20_000, 20_000, 0);
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_polygon(&square(10_000), 0, wall);
        // Travel to the start, then the loop
        assert_eq!(plan.paths().len(), 2);
        assert_eq!(plan.paths()[0].config, GCodePlanner::TRAVEL_CONFIG);
        let loop_points: Vec<Point> =
            plan.paths()[1].points.iter().map(|p| p.xy()).collect();
        assert_eq!(
            loop_points,
            vec![
                Point::new(10_000, 0),
                Point::new(10_000, 10_000),
                Point::new(0, 10_000),
                Point::new(0, 0),
            ]
        );
        assert_eq!(plan.last_position(), Point::new(0, 0));
    }

    #[test]
    fn test_queue_polygon_closed_loop_from_start_index() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_polygon(&square(10_000), 2, wall);
        let loop_points: Vec<Point> =
            plan.paths()[1].points.iter().map(|p| p.xy()).collect();
        assert_eq!(
            loop_points,
            vec![
                Point::new(0, 10_000),
                Point::new(0, 0),
                Point::new(10_000, 0),
                Point::new(10_000, 10_000),
            ]
        );
    }

    #[test]
    fn test_queue_open_path_forward_and_backward() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let cfg =
            plan.add_config(PathConfig::new(PathKind::Infill, 60.0, 400).with_closed_loop(false));
        let line = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(5_000, 0),
            Point::new(10_000, 0),
        ]);

        plan.queue_polygon(&line, 0, cfg);
        let forward: Vec<Point> = plan.paths()[0].points.iter().map(|p| p.xy()).collect();
        assert_eq!(forward, vec![Point::new(5_000, 0), Point::new(10_000, 0)]);

        plan.force_new_path_start();
        plan.queue_polygon(&line, 2, cfg);
        let last = plan.paths().last().unwrap();
        let backward: Vec<Point> = last.points.iter().map(|p| p.xy()).collect();
        assert_eq!(backward, vec![Point::new(5_000, 0), Point::new(0, 0)]);
    }

    #[test]
    fn test_min_layer_time_slows_extrusion() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        // 100mm at 50mm/s: 2 seconds of extrusion
        plan.queue_extrusion(Point::new(100_000, 0), wall);
        plan.force_minimum_layer_time(10.0, 5.0);
        // 2s / 10s: 20%
        assert_eq!(plan.extrude_speed_factor(), 20);
        assert!((plan.total_print_time() - 10.0).abs() < 1e-6);
        assert!(plan.extra_time() < 1e-6);
    }

    #[test]
    fn test_min_layer_time_respects_speed_floor() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(100_000, 0), wall);
        // Reaching 100s would need 2%, but 10mm/s of 50mm/s floors at 20%
        plan.force_minimum_layer_time(100.0, 10.0);
        assert_eq!(plan.extrude_speed_factor(), 20);
        // The unabsorbed slack is recorded
        assert!(plan.extra_time() > 0.0);
    }

    #[test]
    fn test_min_layer_time_factor_never_increases() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(100_000, 0), wall);
        plan.force_minimum_layer_time(10.0, 1.0);
        assert_eq!(plan.extrude_speed_factor(), 20);
        // A weaker requirement afterwards does not speed the layer back up
        plan.force_minimum_layer_time(4.0, 1.0);
        assert_eq!(plan.extrude_speed_factor(), 20);
    }

    #[test]
    fn test_min_layer_time_pure_travel_is_noop() {
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.queue_travel(Point::new(10_000, 0));
        plan.force_minimum_layer_time(10.0, 5.0);
        assert_eq!(plan.extrude_speed_factor(), 100);
    }

    #[test]
    fn test_write_queued_emits_type_comment_and_speed() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(10_000, 0), wall);
        plan.set_extrude_speed_factor(50);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        assert!(w
            .events
            .contains(&Event::Comment("TYPE:WALL-OUTER".to_string())));
        let moves = w.moves();
        assert_eq!(moves.len(), 1);
        assert!((moves[0].1 - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_queued_retract_before_motion() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.force_retract();
        plan.queue_travel(Point::new(5_000, 0));
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        assert_eq!(w.events[0], Event::Retract);
        assert!(matches!(w.events[1], Event::Move { .. }));
    }

    #[test]
    fn test_extruder_switch_supersedes_retraction() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        plan.set_extruder(1);
        plan.force_retract();
        plan.queue_travel(Point::new(5_000, 0));
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        assert_eq!(w.events[0], Event::Switch(1));
        assert!(!w.events.contains(&Event::Retract));
    }

    #[test]
    fn test_bridge_keeps_nominal_speed_and_fan() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        let bridge = plan.add_config(PathConfig::new(PathKind::Bridge, 30.0, 400));
        plan.queue_extrusion(Point::new(10_000, 0), wall);
        plan.queue_extrusion(Point::new(20_000, 0), bridge);
        plan.queue_extrusion(Point::new(30_000, 0), wall);
        plan.set_extrude_speed_factor(50);
        plan.write_queued(&mut w, 200, 60, 100).unwrap();

        // Bridge fan on entering, normal fan restored after
        let fans: Vec<i64> = w
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Fan(pct) => Some(*pct),
                _ => None,
            })
            .collect();
        assert_eq!(fans, vec![100, 60]);

        let moves = w.moves();
        // Wall slowed to 25mm/s, bridge stays at nominal 30mm/s
        assert!((moves[0].1 - 25.0).abs() < 1e-9);
        assert!((moves[1].1 - 30.0).abs() < 1e-9);
        assert!((moves[2].1 - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_fan_override_without_bridge_fan() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let bridge = plan.add_config(PathConfig::new(PathKind::Bridge, 30.0, 400));
        plan.queue_extrusion(Point::new(10_000, 0), bridge);
        plan.write_queued(&mut w, 200, 60, -1).unwrap();
        assert!(!w.events.iter().any(|e| matches!(e, Event::Fan(_))));
    }

    #[test]
    fn test_outer_wall_trim() {
        // Remove 450µm of arc from the tail: the last segment keeps 550µm
        // of its 1000µm.
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = plan.add_config(PathConfig::new(PathKind::WallOuter, 50.0, 500));
        plan.queue_extrusion(Point::new(1_000, 0), wall);
        plan.queue_extrusion(Point::new(2_000, 0), wall);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        let moves = w.moves();
        assert_eq!(moves.last().unwrap().0.xy(), Point::new(1_550, 0));
    }

    #[test]
    fn test_trim_consumes_whole_segments() {
        let mut points = vec![
            Point3::new(0, 0, 0),
            Point3::new(1_000, 0, 0),
            Point3::new(1_200, 0, 0),
            Point3::new(1_400, 0, 0),
        ];
        // target 450: eats both 200µm tail segments, then shortens the
        // 1000µm one by the remaining 50... but 950 remaining > 100, so the
        // tail lands at 950.
        trim_wall_endpoint(&mut points, 500);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].xy(), Point::new(950, 0));
    }

    #[test]
    fn test_trim_never_removes_all_points() {
        let mut points = vec![Point3::new(0, 0, 0), Point3::new(10, 0, 0)];
        trim_wall_endpoint(&mut points, 500);
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_spiralize_z_interpolation() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let spiral =
            plan.add_config(PathConfig::new(PathKind::WallOuter, 40.0, 400).with_spiralize(true));
        plan.queue_extrusion(Point::new(0, 0), spiral);
        plan.queue_extrusion(Point::new(1_000, 0), spiral);
        plan.queue_extrusion(Point::new(2_000, 0), spiral);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        let zs: Vec<Coord> = w.moves().iter().map(|m| m.0.z).collect();
        assert_eq!(zs, vec![100, 200]);
    }

    #[test]
    fn test_only_last_spiral_gets_lift() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let spiral =
            plan.add_config(PathConfig::new(PathKind::WallOuter, 40.0, 400).with_spiralize(true));
        plan.queue_extrusion(Point::new(1_000, 0), spiral);
        plan.force_new_path_start();
        plan.queue_extrusion(Point::new(2_000, 0), spiral);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        let zs: Vec<Coord> = w.moves().iter().map(|m| m.0.z).collect();
        // First spiral path emits flat; only the last one lifts
        assert_eq!(zs[0], 0);
        assert_eq!(*zs.last().unwrap(), 200);
    }

    #[test]
    fn test_small_move_coalescing() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let skin = plan.add_config(PathConfig::new(PathKind::SolidInfill, 50.0, 500));
        for x in [0, 200, 400, 600, 800] {
            plan.queue_extrusion(Point::new(x, 0), skin);
            plan.force_new_path_start();
        }
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        let moves = w.moves();
        // Pairs collapse to midpoints, then the final point: 3 moves, not 5
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0].0.xy(), Point::new(100, 0));
        assert_eq!(moves[1].0.xy(), Point::new(500, 0));
        assert_eq!(moves[2].0.xy(), Point::new(800, 0));
        // The last move runs at nominal line width
        assert_eq!(moves[2].2, 500);
    }

    #[test]
    fn test_coalescing_skips_short_runs() {
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let skin = plan.add_config(PathConfig::new(PathKind::SolidInfill, 50.0, 500));
        for x in [200, 400] {
            plan.queue_extrusion(Point::new(x, 0), skin);
            plan.force_new_path_start();
        }
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        assert_eq!(w.moves().len(), 2);
    }

    #[test]
    fn test_overlap_merge_toggle_rewrites_loop() {
        let slot = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(10_000, 0),
            Point::new(10_000, 10),
            Point::new(0, 10),
        ]);
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = plan.add_config(PathConfig::new(PathKind::WallInner, 50.0, 100));
        plan.set_merge_overlapping_walls(true);
        plan.queue_polygon(&slot, 0, wall);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        // Some emitted extrusion carries the widened midline
        assert!(w.moves().iter().any(|m| m.2 == 110));
    }

    #[test]
    fn test_overlap_merge_defaults_off() {
        let slot = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(10_000, 0),
            Point::new(10_000, 10),
            Point::new(0, 10),
        ]);
        let mut w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = plan.add_config(PathConfig::new(PathKind::WallInner, 50.0, 100));
        plan.queue_polygon(&slot, 0, wall);
        plan.write_queued(&mut w, 200, -1, -1).unwrap();
        assert!(w.moves().iter().all(|m| m.2 == 100 || m.2 == 0));
    }

    #[test]
    fn test_paths_share_extruder_and_config() {
        // Every point of a path shares the path's extruder and config
        let w = RecordingWriter::new();
        let mut plan = planner(&w);
        let wall = wall_config(&mut plan);
        plan.queue_extrusion(Point::new(1_000, 0), wall);
        plan.set_extruder(1);
        plan.queue_extrusion(Point::new(2_000, 0), wall);
        plan.queue_travel(Point::new(3_000, 0));
        for path in plan.paths() {
            assert!(!path.points.is_empty());
        }
        assert_eq!(plan.paths()[0].extruder, 0);
        assert_eq!(plan.paths()[1].extruder, 1);
        assert_eq!(plan.paths()[2].config, GCodePlanner::TRAVEL_CONFIG);
    }
}
