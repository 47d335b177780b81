//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! Exporting 3 images with 2 workers
//! 001/003 DSC_0042.jpg
//! 002/003 DSC_0040.jpg
//!     Error: Processing failed: Failed to encode out/DSC_0041_framed.jpg
//!     Source: /photos/DSC_0041.jpg
//! Failed: 2 of 3 written
//! ```
//!
//! Progress lines are numbered by completion order, not input order: the
//! counter is the number of files written so far.
//!
//! ## Preview
//!
//! ```text
//! Canvas 998x752
//!     Frame: 998x752 at (0, 0)
//!     Photo: 984x738 at (7, 7)
//!     Padding: top 7, bottom 7
//! Wrote preview.png
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::export::{ExportEvent, JobState};
use crate::imaging::LayoutResult;
use crate::types::Rect;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based counter as `NNN/TTT`, zero-padded to the total's width
/// (at least 3 digits).
fn format_counter(n: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    format!("{n:0>width$}/{total:0>width$}")
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn rect_line(label: &str, rect: &Rect) -> String {
    format!(
        "{}{label}: {}x{} at ({}, {})",
        indent(1),
        rect.width,
        rect.height,
        rect.x,
        rect.y
    )
}

// ============================================================================
// Export
// ============================================================================

/// Format one export event as display lines.
pub fn format_export_event(event: &ExportEvent) -> Vec<String> {
    match event {
        ExportEvent::Started { total, workers } => {
            let noun = if *total == 1 { "image" } else { "images" };
            let worker_noun = if *workers == 1 { "worker" } else { "workers" };
            vec![format!("Exporting {total} {noun} with {workers} {worker_noun}")]
        }
        ExportEvent::Progress {
            completed,
            total,
            current,
        } => vec![format!("{} {current}", format_counter(*completed, *total))],
        ExportEvent::Error { message, path } => vec![
            format!("{}Error: {message}", indent(1)),
            format!("{}Source: {}", indent(1), path.display()),
        ],
        ExportEvent::Finished {
            state,
            completed,
            total,
        } => vec![format_summary(*state, *completed, *total)],
    }
}

/// One-line summary for a finished job.
pub fn format_summary(state: JobState, completed: usize, total: usize) -> String {
    match state {
        JobState::Completed => format!("Exported {completed} of {total}"),
        JobState::Cancelled => format!("Cancelled: {completed} of {total} written"),
        JobState::Failed => format!("Failed: {completed} of {total} written"),
        JobState::Idle | JobState::Running => format!("{state}: {completed} of {total}"),
    }
}

pub fn print_export_event(event: &ExportEvent) {
    for line in format_export_event(event) {
        println!("{line}");
    }
}

/// Warn about sources that map to the same output file.
pub fn format_collisions(collisions: &[(PathBuf, Vec<PathBuf>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (dest, sources) in collisions {
        lines.push(format!(
            "Warning: {} sources write {}",
            sources.len(),
            dest.display()
        ));
        for source in sources {
            lines.push(format!("{}Source: {}", indent(1), source.display()));
        }
    }
    lines
}

pub fn print_collisions(collisions: &[(PathBuf, Vec<PathBuf>)]) {
    for line in format_collisions(collisions) {
        eprintln!("{line}");
    }
}

// ============================================================================
// Preview
// ============================================================================

/// Describe a preview render: canvas, rectangles and the written file.
pub fn format_preview_output(layout: &LayoutResult, written: &Path) -> Vec<String> {
    vec![
        format!("Canvas {}", layout.canvas),
        rect_line("Frame", &layout.frame),
        rect_line("Photo", &layout.photo),
        format!(
            "{}Padding: top {}, bottom {}",
            indent(1),
            layout.padding_top(),
            layout.padding_bottom()
        ),
        format!("Wrote {}", written.display()),
    ]
}

pub fn print_preview_output(layout: &LayoutResult, written: &Path) {
    for line in format_preview_output(layout, written) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn counter_pads_to_three_digits() {
        assert_eq!(format_counter(7, 12), "007/012");
    }

    #[test]
    fn counter_widens_for_large_totals() {
        assert_eq!(format_counter(42, 1500), "0042/1500");
    }

    // =========================================================================
    // Export tests
    // =========================================================================

    #[test]
    fn started_line_pluralizes() {
        let one = format_export_event(&ExportEvent::Started {
            total: 1,
            workers: 1,
        });
        assert_eq!(one, vec!["Exporting 1 image with 1 worker"]);
        let many = format_export_event(&ExportEvent::Started {
            total: 5,
            workers: 2,
        });
        assert_eq!(many, vec!["Exporting 5 images with 2 workers"]);
    }

    #[test]
    fn progress_line() {
        let lines = format_export_event(&ExportEvent::Progress {
            completed: 2,
            total: 3,
            current: "DSC_0040.jpg".into(),
        });
        assert_eq!(lines, vec!["002/003 DSC_0040.jpg"]);
    }

    #[test]
    fn error_lines_name_the_source() {
        let lines = format_export_event(&ExportEvent::Error {
            message: "boom".into(),
            path: PathBuf::from("/photos/a.jpg"),
        });
        assert_eq!(lines, vec!["    Error: boom", "    Source: /photos/a.jpg"]);
    }

    #[test]
    fn summary_per_state() {
        assert_eq!(format_summary(JobState::Completed, 3, 3), "Exported 3 of 3");
        assert_eq!(
            format_summary(JobState::Cancelled, 1, 3),
            "Cancelled: 1 of 3 written"
        );
        assert_eq!(
            format_export_event(&ExportEvent::Finished {
                state: JobState::Failed,
                completed: 2,
                total: 3
            }),
            vec!["Failed: 2 of 3 written"]
        );
    }

    #[test]
    fn collisions_list_every_source() {
        let lines = format_collisions(&[(
            PathBuf::from("/out/img_framed.jpg"),
            vec![PathBuf::from("/a/img.jpg"), PathBuf::from("/b/img.jpg")],
        )]);
        assert_eq!(
            lines,
            vec![
                "Warning: 2 sources write /out/img_framed.jpg",
                "    Source: /a/img.jpg",
                "    Source: /b/img.jpg",
            ]
        );
    }

    // =========================================================================
    // Preview tests
    // =========================================================================

    #[test]
    fn preview_output_describes_layout() {
        let layout = LayoutResult {
            canvas: Size::new(998, 752),
            frame: Rect::new(0, 0, 998, 752),
            photo: Rect::new(7, 7, 984, 738),
        };
        let lines = format_preview_output(&layout, Path::new("preview.png"));
        assert_eq!(
            lines,
            vec![
                "Canvas 998x752",
                "    Frame: 998x752 at (0, 0)",
                "    Photo: 984x738 at (7, 7)",
                "    Padding: top 7, bottom 7",
                "Wrote preview.png",
            ]
        );
    }
}
