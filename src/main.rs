//! Layerplan CLI - plan layer geometry into G-code
//!
//! Usage:
//!   layerplan-cli plan <job.json> -o <output.gcode> [options]
//!   layerplan-cli info <job.json>
//!
//! A job file describes a stack of layers, each a list of features
//! (polygons or open paths with a kind, speed and line width), plus the
//! printer settings the planner needs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use layerplan::{
    scale, AvoidCrossingPerimeters, CodeWriter, GCodePlanner, GCodeWriter, PathConfig, PathKind,
    Point, Polygon,
};
use log::{info, LevelFilter};
use serde::Deserialize;
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

/// A layer toolpath planner for fused-filament 3D printing
#[derive(Parser, Debug)]
#[command(name = "layerplan-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan a job file and generate G-code
    Plan {
        /// Input job file (JSON)
        #[arg(value_name = "JOB")]
        job: PathBuf,

        /// Output G-code file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Print statistics about a job file
    Info {
        /// Input job file (JSON)
        #[arg(value_name = "JOB")]
        job: PathBuf,
    },
}

/// Printer and planning settings of a job.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
    /// Travel speed (mm/s).
    travel_speed: f64,
    /// Travels shorter than this never retract (mm).
    retraction_minimum_distance: f64,
    /// Retraction distance (mm).
    retraction_distance: f64,
    /// Retraction speed (mm/s).
    retraction_speed: f64,
    /// Minimum time one layer must take (s).
    minimum_layer_time: f64,
    /// Speed floor for layer-time slowdown (mm/s).
    minimum_print_speed: f64,
    /// Part cooling fan duty (percent), negative for none.
    fan_speed: i64,
    /// Fan duty over bridges (percent), negative for no override.
    bridge_fan_speed: i64,
    /// Layer thickness (mm).
    layer_thickness: f64,
    /// Filament diameter (mm).
    filament_diameter: f64,
    /// Route travels inside the layer's outer walls.
    avoid_crossing_perimeters: bool,
    /// How far inside the outer walls travels are kept (mm).
    travel_boundary_inset: f64,
    /// Merge self-overlapping wall stretches into wider extrusions.
    merge_overlapping_walls: bool,
    /// Retract on every travel that crosses nothing.
    always_retract: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            travel_speed: 150.0,
            retraction_minimum_distance: 1.5,
            retraction_distance: 4.5,
            retraction_speed: 25.0,
            minimum_layer_time: 5.0,
            minimum_print_speed: 10.0,
            fan_speed: 100,
            bridge_fan_speed: -1,
            layer_thickness: 0.2,
            filament_diameter: 1.75,
            avoid_crossing_perimeters: true,
            travel_boundary_inset: 0.4,
            merge_overlapping_walls: false,
            always_retract: false,
        }
    }
}

/// One feature of a layer: a set of polygons sharing a config.
#[derive(Debug, Deserialize)]
struct Feature {
    kind: PathKind,
    /// Print speed (mm/s).
    speed: f64,
    /// Line width (mm).
    line_width: f64,
    #[serde(default)]
    spiralize: bool,
    #[serde(default = "default_true")]
    closed: bool,
    /// Point lists in mm.
    polygons: Vec<Vec<[f64; 2]>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Layer {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    settings: Settings,
    layers: Vec<Layer>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Plan { job, output } => plan(&job, &output),
        Commands::Info { job } => print_info(&job),
    }
}

fn load_job(path: &PathBuf) -> Result<Job> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let job: Job = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    validate_job(&job).with_context(|| format!("Invalid job file {}", path.display()))?;
    Ok(job)
}

/// Reject job geometry whose planner behavior is undefined: degenerate
/// polygons and extruding features without a line width.
fn validate_job(job: &Job) -> layerplan::Result<()> {
    for (index, layer) in job.layers.iter().enumerate() {
        for feature in &layer.features {
            if feature.kind != PathKind::Travel && feature.line_width <= 0.0 {
                return Err(layerplan::Error::Config(format!(
                    "layer {}: {:?} feature has no line width",
                    index, feature.kind
                )));
            }
            let minimum_points = if feature.closed { 3 } else { 2 };
            for polygon in &feature.polygons {
                if polygon.len() < minimum_points {
                    return Err(layerplan::Error::Geometry(format!(
                        "layer {}: polygon with {} points (need at least {})",
                        index,
                        polygon.len(),
                        minimum_points
                    )));
                }
            }
        }
    }
    Ok(())
}

fn to_polygon(points: &[[f64; 2]]) -> Polygon {
    points
        .iter()
        .map(|p| Point::new(scale(p[0]), scale(p[1])))
        .collect()
}

fn plan(job_path: &PathBuf, output: &PathBuf) -> Result<()> {
    let job = load_job(job_path)?;
    let settings = &job.settings;

    let file = fs::File::create(output)
        .with_context(|| format!("Failed to create output file {}", output.display()))?;
    let mut writer = GCodeWriter::new(BufWriter::new(file));
    writer.set_layer_thickness(scale(settings.layer_thickness));
    writer.set_filament_diameter(settings.filament_diameter);
    writer.set_retraction(settings.retraction_distance, settings.retraction_speed);

    writer.comment(&format!("generated by layerplan-cli {}", layerplan::VERSION))?;
    writer.comment(&format!("LAYER_COUNT:{}", job.layers.len()))?;

    let progress = ProgressBar::new(job.layers.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] layer {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let layer_thickness = scale(settings.layer_thickness);
    let retraction_min = scale(settings.retraction_minimum_distance);
    for (index, layer) in job.layers.iter().enumerate() {
        let z = layer_thickness * (index as i64 + 1);
        writer.comment(&format!("LAYER:{}", index))?;
        writer.write_layer_change(z, settings.travel_speed)?;

        let mut plan = GCodePlanner::new(&writer, settings.travel_speed, retraction_min);
        plan.set_always_retract(settings.always_retract);
        plan.set_merge_overlapping_walls(settings.merge_overlapping_walls);

        if settings.avoid_crossing_perimeters {
            let walls: Vec<Polygon> = layer
                .features
                .iter()
                .filter(|f| f.kind == PathKind::WallOuter)
                .flat_map(|f| f.polygons.iter().map(|p| to_polygon(p)))
                .collect();
            if !walls.is_empty() {
                plan.set_avoidance(Some(Box::new(AvoidCrossingPerimeters::from_outer_walls(
                    &walls,
                    scale(settings.travel_boundary_inset),
                ))));
            }
        }

        for feature in &layer.features {
            let config = plan.add_config(
                PathConfig::new(feature.kind, feature.speed, scale(feature.line_width))
                    .with_spiralize(feature.spiralize)
                    .with_closed_loop(feature.closed),
            );
            let polygons: Vec<Polygon> = feature.polygons.iter().map(|p| to_polygon(p)).collect();
            if feature.closed {
                plan.queue_polygons_by_optimizer(&polygons, config);
            } else {
                for polygon in &polygons {
                    plan.queue_polygon(polygon, 0, config);
                }
            }
        }

        // First layer sticks better slow; later layers only slow down for
        // cooling
        if index == 0 {
            plan.set_extrude_speed_factor(50);
        }
        plan.force_minimum_layer_time(settings.minimum_layer_time, settings.minimum_print_speed);
        plan.write_queued(
            &mut writer,
            layer_thickness,
            settings.fan_speed,
            settings.bridge_fan_speed,
        )?;

        info!(
            "layer {}: {} paths, {:.1}s",
            index,
            plan.paths().len(),
            plan.total_print_time()
        );
        progress.inc(1);
    }
    progress.finish_and_clear();

    let print_time = writer.total_print_time();
    let filament = writer.extrusion_amount();
    writer.finish()?;

    println!("Wrote {}", output.display());
    println!("Estimated print time: {:.0}s", print_time);
    println!("Filament used: {:.0}mm", filament);
    Ok(())
}

fn print_info(job_path: &PathBuf) -> Result<()> {
    let job = load_job(job_path)?;

    let mut features = 0usize;
    let mut polygons = 0usize;
    let mut points = 0usize;
    for layer in &job.layers {
        features += layer.features.len();
        for feature in &layer.features {
            polygons += feature.polygons.len();
            points += feature.polygons.iter().map(|p| p.len()).sum::<usize>();
        }
    }

    println!("Layers:   {}", job.layers.len());
    println!("Features: {}", features);
    println!("Polygons: {}", polygons);
    println!("Points:   {}", points);
    println!(
        "Layer thickness: {:.2}mm, minimum layer time: {:.1}s",
        job.settings.layer_thickness, job.settings.minimum_layer_time
    );
    Ok(())
}
