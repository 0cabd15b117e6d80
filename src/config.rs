//! Path configuration types.
//!
//! A [`PathConfig`] names a motion kind together with its nominal speed,
//! line width and loop flags. The planner groups queued moves by config,
//! comparing interned [`PathConfigId`]s rather than config values, so two
//! structurally equal configs registered separately still start separate
//! paths.

use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};

/// The kind of feature a path prints.
///
/// The kind determines the `;TYPE:` comment tag written ahead of the
/// feature and which emission-time rewrites apply: wall kinds get their
/// loop endpoint trimmed, bridges keep nominal speed under a layer-time
/// slowdown and run at their own fan duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathKind {
    /// Non-extruding move.
    Travel,
    /// Outermost (visible) wall.
    WallOuter,
    /// Structural inner wall.
    WallInner,
    /// Sparse infill.
    Infill,
    /// Solid top/bottom infill.
    SolidInfill,
    /// Extrusion spanning empty space.
    Bridge,
    /// Skirt/brim around the part.
    Skirt,
    /// Support material.
    Support,
    /// Raft under the part.
    Raft,
}

impl PathKind {
    /// The G-code `;TYPE:` tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            PathKind::Travel => "TRAVEL",
            PathKind::WallOuter => "WALL-OUTER",
            PathKind::WallInner => "WALL-INNER",
            PathKind::Infill => "FILL",
            PathKind::SolidInfill => "SKIN",
            PathKind::Bridge => "BRIDGE",
            PathKind::Skirt => "SKIRT",
            PathKind::Support => "SUPPORT",
            PathKind::Raft => "RAFT",
        }
    }

    /// Whether this kind is one of the two perimeter walls.
    #[inline]
    pub fn is_wall(&self) -> bool {
        matches!(self, PathKind::WallOuter | PathKind::WallInner)
    }

    /// Whether this kind bridges open air.
    #[inline]
    pub fn is_bridge(&self) -> bool {
        matches!(self, PathKind::Bridge)
    }
}

/// Configuration bundle for one kind of motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// What feature this config prints.
    pub kind: PathKind,

    /// Nominal speed (mm/s).
    pub speed: CoordF,

    /// Extrusion line width (µm). 0 for travel.
    pub line_width: Coord,

    /// Print this path as a single continuous helix with Z rising linearly
    /// along the layer's perimeter.
    #[serde(default)]
    pub spiralize: bool,

    /// Whether polygons queued with this config close back to their start.
    #[serde(default = "default_closed_loop")]
    pub closed_loop: bool,
}

fn default_closed_loop() -> bool {
    true
}

impl PathConfig {
    /// Create a closed-loop config.
    pub fn new(kind: PathKind, speed: CoordF, line_width: Coord) -> Self {
        Self {
            kind,
            speed,
            line_width,
            spiralize: false,
            closed_loop: true,
        }
    }

    /// Create a travel config (line width 0).
    pub fn travel(speed: CoordF) -> Self {
        Self {
            kind: PathKind::Travel,
            speed,
            line_width: 0,
            spiralize: false,
            closed_loop: false,
        }
    }

    /// Set the spiralize flag.
    pub fn with_spiralize(mut self, spiralize: bool) -> Self {
        self.spiralize = spiralize;
        self
    }

    /// Set the closed-loop flag.
    pub fn with_closed_loop(mut self, closed_loop: bool) -> Self {
        self.closed_loop = closed_loop;
        self
    }

    /// Whether this config extrudes material.
    #[inline]
    pub fn is_extruding(&self) -> bool {
        self.line_width > 0
    }
}

/// Identity of an interned [`PathConfig`] within one planner.
///
/// Move grouping compares ids, not config values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathConfigId(pub(crate) usize);

impl PathConfigId {
    /// Arena index of this config.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(PathKind::WallOuter.tag(), "WALL-OUTER");
        assert_eq!(PathKind::WallInner.tag(), "WALL-INNER");
        assert_eq!(PathKind::Bridge.tag(), "BRIDGE");
    }

    #[test]
    fn test_predicates() {
        assert!(PathKind::WallOuter.is_wall());
        assert!(PathKind::WallInner.is_wall());
        assert!(!PathKind::Infill.is_wall());
        assert!(PathKind::Bridge.is_bridge());
    }

    #[test]
    fn test_travel_config_has_no_width() {
        let cfg = PathConfig::travel(150.0);
        assert_eq!(cfg.line_width, 0);
        assert!(!cfg.is_extruding());
        assert!(!cfg.closed_loop);
    }

    #[test]
    fn test_builder_flags() {
        let cfg = PathConfig::new(PathKind::WallOuter, 40.0, 400)
            .with_spiralize(true)
            .with_closed_loop(false);
        assert!(cfg.spiralize);
        assert!(!cfg.closed_loop);
        assert!(cfg.is_extruding());
    }
}
