//! The writer boundary: position- and extruder-tracking G-code output.
//!
//! The planner drives a [`CodeWriter`], a capability interface that tracks
//! printer position and extruder state and formats motion commands. The
//! concrete [`GCodeWriter`] emits RepRap-flavor text: absolute-E `G0`/`G1`
//! moves, `M106`/`M107` fan control, `T<n>` extruder selection and `;`
//! comments.

use crate::geometry::{Point, Point3};
use crate::{Coord, CoordF, Result};
use log::debug;
use std::f64::consts::PI;
use std::io::Write;

/// Capability interface the planner emits through.
///
/// Position getters are infallible; everything that produces output
/// returns a `Result` so I/O failures surface through the planner's flush.
pub trait CodeWriter {
    /// Current Z (µm).
    fn position_z(&self) -> Coord;

    /// Current XY position (µm).
    fn position_2d(&self) -> Point;

    /// Current full position (µm).
    fn position_3d(&self) -> Point3;

    /// Index of the active extruder.
    fn current_extruder(&self) -> usize;

    /// Select a different extruder. Implies whatever retraction the writer
    /// performs around a switch.
    fn switch_extruder(&mut self, extruder: usize) -> Result<()>;

    /// Pull filament back to stop oozing.
    fn retract(&mut self) -> Result<()>;

    /// Set part-cooling fan duty (percent, 0 turns the fan off).
    fn fan(&mut self, pct: i64) -> Result<()>;

    /// Emit a comment line.
    fn comment(&mut self, text: &str) -> Result<()>;

    /// Move to `p`, extruding according to `line_width` (0 = travel).
    fn write_move(&mut self, p: Point3, speed: CoordF, line_width: Coord) -> Result<()>;

    /// Fold the time of all moves since the last call into the total
    /// print-time estimate.
    fn update_total_print_time(&mut self);
}

/// Concrete G-code text writer.
///
/// Tracks position, extrusion amount and retraction state, and estimates
/// print time from move lengths and feedrates.
pub struct GCodeWriter<W: Write> {
    out: W,
    position: Point3,
    extruder: usize,
    /// Absolute E value (mm of filament).
    extrusion_amount: CoordF,
    retracted: bool,
    /// Filament pulled back by one retraction (mm).
    retraction_distance: CoordF,
    /// Retraction feedrate (mm/s).
    retraction_speed: CoordF,
    /// Layer thickness used for volumetric E calculation (µm).
    layer_thickness: Coord,
    /// Filament diameter (mm).
    filament_diameter: CoordF,
    /// Flow multiplier (1.0 = normal).
    flow: CoordF,
    /// Feedrate of the previous move (mm/s), to skip redundant F words.
    current_speed: CoordF,
    /// Seconds of motion since the last `update_total_print_time`.
    pending_time: f64,
    total_print_time: f64,
}

impl<W: Write> GCodeWriter<W> {
    /// Create a writer at the origin with extruder 0 selected.
    pub fn new(out: W) -> Self {
        Self {
            out,
            position: Point3::new(0, 0, 0),
            extruder: 0,
            extrusion_amount: 0.0,
            retracted: false,
            retraction_distance: 4.5,
            retraction_speed: 25.0,
            layer_thickness: 200,
            filament_diameter: 1.75,
            flow: 1.0,
            current_speed: -1.0,
            pending_time: 0.0,
            total_print_time: 0.0,
        }
    }

    /// Set the retraction distance (mm) and speed (mm/s).
    pub fn set_retraction(&mut self, distance: CoordF, speed: CoordF) {
        self.retraction_distance = distance;
        self.retraction_speed = speed;
    }

    /// Set the layer thickness (µm) used for E calculation.
    pub fn set_layer_thickness(&mut self, thickness: Coord) {
        self.layer_thickness = thickness;
    }

    /// Set the filament diameter (mm).
    pub fn set_filament_diameter(&mut self, diameter: CoordF) {
        self.filament_diameter = diameter;
    }

    /// Set the flow multiplier.
    pub fn set_flow(&mut self, flow: CoordF) {
        self.flow = flow;
    }

    /// Jump the tracked position without emitting a move, e.g. after homing
    /// or a firmware-side priming routine.
    pub fn set_position(&mut self, p: Point3) {
        self.position = p;
    }

    /// Move the tracked Z to a new layer height (µm), emitting the move.
    pub fn write_layer_change(&mut self, z: Coord, speed: CoordF) -> Result<()> {
        self.write_move(Point3::new(self.position.x, self.position.y, z), speed, 0)
    }

    /// Total estimated print time (seconds), including pending moves.
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time + self.pending_time
    }

    /// Filament used so far (mm of raw filament).
    pub fn extrusion_amount(&self) -> CoordF {
        self.extrusion_amount
    }

    /// Consume the writer, flushing and returning the underlying output.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    /// mm of filament per mm of path for the given line width.
    fn extrusion_per_mm(&self, line_width: Coord) -> CoordF {
        let filament_area = PI * (self.filament_diameter / 2.0) * (self.filament_diameter / 2.0);
        crate::unscale(line_width) * crate::unscale(self.layer_thickness) * self.flow
            / filament_area
    }

    fn write_feedrate(&mut self, speed: CoordF) -> Result<()> {
        if (speed - self.current_speed).abs() > f64::EPSILON {
            write!(self.out, " F{:.0}", speed * 60.0)?;
            self.current_speed = speed;
        }
        Ok(())
    }
}

impl<W: Write> CodeWriter for GCodeWriter<W> {
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
        if self.extruder == extruder {
            return Ok(());
        }
        self.retract()?;
        self.extruder = extruder;
        writeln!(self.out, "T{}", extruder)?;
        // Fresh extruder, fresh E axis
        self.extrusion_amount = 0.0;
        writeln!(self.out, "G92 E0")?;
        debug!("switched to extruder {}", extruder);
        Ok(())
    }

    fn retract(&mut self) -> Result<()> {
        if self.retracted {
            return Ok(());
        }
        writeln!(
            self.out,
            "G1 F{:.0} E{:.5}",
            self.retraction_speed * 60.0,
            self.extrusion_amount - self.retraction_distance
        )?;
        self.current_speed = self.retraction_speed;
        self.retracted = true;
        Ok(())
    }

    fn fan(&mut self, pct: i64) -> Result<()> {
        if pct > 0 {
            writeln!(self.out, "M106 S{}", (pct.min(100) * 255 + 50) / 100)?;
        } else {
            writeln!(self.out, "M107")?;
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, ";{}", text)?;
        Ok(())
    }

    fn write_move(&mut self, p: Point3, speed: CoordF, line_width: Coord) -> Result<()> {
        if p == self.position {
            return Ok(());
        }

        if line_width > 0 {
            if self.retracted {
                writeln!(
                    self.out,
                    "G1 F{:.0} E{:.5}",
                    self.retraction_speed * 60.0,
                    self.extrusion_amount
                )?;
                self.current_speed = self.retraction_speed;
                self.retracted = false;
            }
            let length_mm = (p - self.position).length_mm();
            self.extrusion_amount += self.extrusion_per_mm(line_width) * length_mm;
            write!(self.out, "G1")?;
        } else {
            write!(self.out, "G0")?;
        }

        self.write_feedrate(speed)?;
        write!(
            self.out,
            " X{:.3} Y{:.3}",
            crate::unscale(p.x),
            crate::unscale(p.y)
        )?;
        if p.z != self.position.z {
            write!(self.out, " Z{:.3}", crate::unscale(p.z))?;
        }
        if line_width > 0 {
            write!(self.out, " E{:.5}", self.extrusion_amount)?;
        }
        writeln!(self.out)?;

        if speed > 0.0 {
            self.pending_time += (p - self.position).length_mm() / speed;
        }
        self.position = p;
        Ok(())
    }

    fn update_total_print_time(&mut self) {
        self.total_print_time += self.pending_time;
        self.pending_time = 0.0;
        debug!("estimated print time: {:.1}s", self.total_print_time);
    }
}
