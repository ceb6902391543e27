//! CLI output formatting for batch runs.
//!
//! Every image gets a header line (positional index + source path) followed
//! by indented context lines:
//!
//! ```text
//! Shrinking 2 images
//! 001 photos/dawn.png
//!     Export: shrunk/dawn.jpeg (JPEG 1000x500)
//!     Size: 3.1MiB → 412.5KiB (12.99%), 0.231s
//! 002 photos/broken.png
//!     Error: decode failed: ...
//!
//! Shrunk 1 image: 3.1MiB → 412.5KiB (12.99%)
//! Failed 1 image
//! ```
//!
//! Indices are 1-based positions in the discovered list, so lines from a
//! parallel run can be matched back to inputs even when they arrive out of
//! order.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure, no I/O.

use crate::batch::{BatchEvent, BatchReport, FailedImage, ShrunkImage};
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Human-readable byte count with binary units.
///
/// ```text
/// 512      → 512.0B
/// 3250585  → 3.1MiB
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut num = bytes as f64;
    for unit in ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"] {
        if num < 1024.0 {
            return format!("{num:3.1}{unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1}YiB")
}

/// Output size relative to input size, as a percentage.
pub fn format_ratio(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

fn overall_ratio(report: &BatchReport) -> f64 {
    if report.total_input_size == 0 {
        return 1.0;
    }
    report.total_output_size as f64 / report.total_input_size as f64
}

// ============================================================================
// Per-image events
// ============================================================================

fn shrunk_lines(index: usize, image: &ShrunkImage) -> Vec<String> {
    let (width, height) = image.output_dimensions;
    let mut export = format!(
        "{}Export: {} ({} {}x{}",
        indent(1),
        image.destination.display(),
        image.output_format,
        width,
        height
    );
    if let Some(colors) = image.palette_len {
        export.push_str(&format!(", {colors} colors"));
    }
    export.push(')');

    vec![
        format!("{} {}", format_index(index + 1), image.source.display()),
        export,
        format!(
            "{}Size: {} → {} ({}), {}",
            indent(1),
            format_size(image.input_size),
            format_size(image.output_size),
            format_ratio(image.ratio()),
            format_elapsed(image.elapsed)
        ),
    ]
}

fn failed_lines(index: usize, failure: &FailedImage) -> Vec<String> {
    vec![
        format!("{} {}", format_index(index + 1), failure.source.display()),
        format!("{}Error: {}", indent(1), failure.error),
    ]
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total } => vec![format!("Shrinking {}", plural(*total, "image"))],
        BatchEvent::Shrunk { index, image } => shrunk_lines(*index, image),
        BatchEvent::Failed { index, failure } => failed_lines(*index, failure),
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Totals line plus one line per failed image.
pub fn format_batch_summary(report: &BatchReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Shrunk {}: {} → {} ({})",
        plural(report.shrunk.len(), "image"),
        format_size(report.total_input_size),
        format_size(report.total_output_size),
        format_ratio(overall_ratio(report))
    )];
    if report.has_failures() {
        lines.push(format!("Failed {}", plural(report.failed.len(), "image")));
        for failure in &report.failed {
            lines.push(format!("{}{}", indent(1), failure.source.display()));
        }
    }
    lines
}

pub fn print_batch_summary(report: &BatchReport) {
    for line in format_batch_summary(report) {
        println!("{}", line);
    }
}
