//! # layerplan
//!
//! A layer toolpath planner for fused-filament 3D printing.
//!
//! The planner consumes geometric primitives (closed polygons and open
//! paths) in layer-local integer coordinates and produces an ordered stream
//! of printer motion commands: travel moves, extrusion moves, retractions,
//! extruder switches, fan changes and type comments, written through a
//! G-code writer.
//!
//! The main pieces:
//! - Move queuing and buffering: travel and extrusion moves accumulate into
//!   path segments grouped by extrusion configuration, so post-processing
//!   passes can still rewrite them before anything is emitted.
//! - Travel routing: travels are routed inside a designated boundary (the
//!   part's outer walls) where possible, and retractions are inserted only
//!   when a travel leaves that boundary or is long enough to ooze.
//! - Perimeter overlap merging: where a wall crosses back over itself the
//!   doubled segments are rewritten as a single wider extrusion.
//! - Layer-time enforcement: extrusion speeds are scaled down (subject to a
//!   floor) so small layers take at least a configured minimum time.
//! - Emission: a single flushing walk applies speed scaling, spiral Z lift,
//!   small-move coalescing and wall endpoint trimming, then drives the
//!   writer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use layerplan::{GCodePlanner, GCodeWriter, PathConfig, PathKind};
//!
//! let mut writer = GCodeWriter::new(std::io::stdout());
//! let mut plan = GCodePlanner::new(&writer, 150.0, 1500);
//! let wall = plan.add_config(PathConfig::new(PathKind::WallOuter, 40.0, 400));
//! plan.queue_polygon(&polygon, 0, wall);
//! plan.force_minimum_layer_time(5.0, 10.0);
//! plan.write_queued(&mut writer, 200, 100, -1)?;
//! ```

pub mod clipper;
pub mod config;
pub mod gcode;
pub mod geometry;
pub mod order;
pub mod travel;

pub use config::{PathConfig, PathConfigId, PathKind};
pub use gcode::overlap::{remove_perimeter_overlaps, PathAndWidth};
pub use gcode::planner::{GCodePath, GCodePlanner};
pub use gcode::writer::{CodeWriter, GCodeWriter};
pub use geometry::{Point, Point3, Polygon, Segment};
pub use order::IslandOrderOptimizer;
pub use travel::{AvoidCrossingPerimeters, CrossingAvoidance};

/// Coordinate type used throughout the planner.
/// Using i64 for integer micrometer coordinates to avoid floating-point issues.
pub type Coord = i64;

/// Floating-point coordinate type for unscaled (mm) values.
pub type CoordF = f64;

/// Scaling factor: coordinates are stored as integer micrometers.
/// 1 unit = 1 micrometer, so 1mm = 1_000 units.
pub const SCALING_FACTOR: f64 = 1_000.0;

/// Scale a millimeter value to integer micrometers.
#[inline]
pub fn scale(v: CoordF) -> Coord {
    (v * SCALING_FACTOR).round() as Coord
}

/// Unscale integer micrometers to millimeters.
#[inline]
pub fn unscale(v: Coord) -> CoordF {
    v as CoordF / SCALING_FACTOR
}

/// Result type used throughout the planner.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for planner operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
