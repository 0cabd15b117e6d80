//! Perimeter overlap detection and merging.
//!
//! A perimeter that doubles back on itself (a thin slot, a pinched wall)
//! would deposit material twice along the coincident stretch. This module
//! finds segment pairs that are antiparallel and close at both endpoints,
//! replaces each pair with a single midline segment carrying a widened
//! extrusion, and re-cuts the perimeter into fragments of uniform width.
//!
//! # Algorithm
//!
//! 1. Precondition the perimeter with
//!    [`make_close_segments_mergeable`](crate::geometry::make_close_segments_mergeable)
//!    so both sides of a near-parallel run have matching vertices.
//! 2. Explode into closed segments.
//! 3. Match segment `i` against each later segment `j`: a pair merges when
//!    `|i.from - j.to|` and `|i.to - j.from|` are both inside the merge
//!    distance.
//! 4. Rewrite the first of the pair to the pair's midline, tag it merged
//!    with the smaller endpoint gap as its width, drop the second.
//! 5. Re-cut the surviving segment list into fragments wherever
//!    consecutive segments disconnect or change width.

use crate::geometry::{make_close_segments_mergeable, midpoint3, path_to_segments, Point3};
use crate::Coord;
use log::debug;

/// One stretch of perimeter with a uniform extrusion width.
#[derive(Debug, Clone, PartialEq)]
pub struct PathAndWidth {
    /// The points of this stretch.
    pub points: Vec<Point3>,
    /// Extrusion width (µm).
    pub extrusion_width: Coord,
}

/// Per-segment annotation used while merging.
///
/// Merged and removed are mutually exclusive, so this is a tagged state
/// rather than a pair of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Altered {
    Untouched,
    Merged,
    Removed,
}

/// Detect and merge self-overlapping stretches of a closed perimeter.
///
/// `overlap_merge` is both the match tolerance and the base extrusion
/// width added to every output fragment: untouched fragments come out at
/// `overlap_merge`, merged ones at their residual gap plus `overlap_merge`.
///
/// Returns whether any pair merged, and the perimeter re-cut into
/// [`PathAndWidth`] fragments (a single fragment equal to the input when
/// nothing merged).
pub fn remove_perimeter_overlaps(
    perimeter: &[Point3],
    overlap_merge: Coord,
) -> (bool, Vec<PathAndWidth>) {
    let preconditioned = make_close_segments_mergeable(perimeter, overlap_merge);
    let mut segments = path_to_segments(&preconditioned, true);
    let mut state = vec![Altered::Untouched; segments.len()];

    let mut modified = false;
    for i in 0..segments.len() {
        if state[i] != Altered::Untouched {
            continue;
        }
        for j in (i + 1)..segments.len() {
            if state[j] != Altered::Untouched {
                continue;
            }
            let gap_start = (segments[i].from.xy() - segments[j].to.xy()).length();
            let gap_end = (segments[i].to.xy() - segments[j].from.xy()).length();
            if gap_start < overlap_merge && gap_end < overlap_merge {
                let (from, to) = (segments[j].from, segments[j].to);
                segments[i].width = gap_start.min(gap_end);
                segments[i].from = midpoint3(segments[i].from, to);
                segments[i].to = midpoint3(segments[i].to, from);
                state[i] = Altered::Merged;
                state[j] = Altered::Removed;
                modified = true;
                break;
            }
        }
    }

    for i in (0..segments.len()).rev() {
        if state[i] == Altered::Removed {
            segments.remove(i);
        }
    }

    if modified {
        debug!(
            "merged overlapping perimeter stretches: {} of {} segments remain",
            segments.len(),
            preconditioned.len()
        );
    }

    // Re-cut into fragments of uniform width
    let mut fragments: Vec<PathAndWidth> = Vec::new();
    let mut previous: Option<&crate::geometry::Segment> = None;
    for seg in &segments {
        let connected = previous.map_or(false, |p| p.to == seg.from && p.width == seg.width);
        if !connected {
            fragments.push(PathAndWidth {
                points: vec![seg.from],
                extrusion_width: seg.width + overlap_merge,
            });
        }
        if let Some(fragment) = fragments.last_mut() {
            fragment.points.push(seg.to);
        }
        previous = Some(seg);
    }

    (modified, fragments)
}
