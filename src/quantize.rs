//! Palette reduction by weighted k-means.
//!
//! The quantizer clusters the image's *distinct* colors, each weighted by how
//! many pixels carry it, then maps every pixel to its nearest center. The run
//! is fully deterministic: seeds come from a frequency ordering, ties go to
//! the lower-indexed center, and there is no random sampling anywhere, so the
//! same input always yields the same palette.
//!
//! Colors are clustered as 4-D RGBA points. For opaque images every alpha is
//! 255, which makes the fourth axis inert and the distance plain RGB.

use crate::pipeline::ShrinkError;
use crate::types::{ColorMode, MAX_PALETTE_LEN, RawImage, Rgba};
use std::collections::{HashMap, HashSet};

/// Upper bound on distinct colors used to train the centers.
pub const MAX_SAMPLE: usize = 10_000;

/// Lloyd iterations before giving up on convergence.
const MAX_ITERATIONS: usize = 64;

/// Stop once no center moves further than this (squared distance).
const CONVERGENCE_THRESHOLD: f64 = 0.25;

/// Largest value of `target_color_count`.
pub const MAX_COLORS: u16 = MAX_PALETTE_LEN as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizationPlan {
    pub target_color_count: u16,
    pub dithering: bool,
}

impl QuantizationPlan {
    pub fn new(target_color_count: u16, dithering: bool) -> Self {
        Self {
            target_color_count,
            dithering,
        }
    }

    pub fn validate(&self) -> Result<(), ShrinkError> {
        if self.target_color_count == 0 || self.target_color_count > MAX_COLORS {
            return Err(ShrinkError::InvalidConfiguration {
                field: "palette.target_color_count",
                reason: format!("must be 1-{MAX_COLORS}, got {}", self.target_color_count),
            });
        }
        Ok(())
    }
}

/// Whether an image with `distinct_colors` colors should be reduced to
/// `target`. Only truecolor layouts qualify.
pub fn should_quantize(distinct_colors: usize, target: u16, mode: ColorMode) -> bool {
    mode.is_truecolor() && distinct_colors > target as usize
}

/// Reduce `image` to at most `plan.target_color_count` colors.
///
/// Images that already fit (or are grayscale / indexed) are returned
/// unchanged. Otherwise the result is an [`ColorMode::Indexed`] image whose
/// palette holds the rounded cluster centers; metadata is carried over.
pub fn quantize(mut image: RawImage, plan: &QuantizationPlan) -> Result<RawImage, ShrinkError> {
    plan.validate()?;

    let histogram = color_histogram(&image);
    if !should_quantize(histogram.len(), plan.target_color_count, image.mode()) {
        return Ok(image);
    }

    let ordered = frequency_order(histogram);
    let training = stride_sample(&ordered, MAX_SAMPLE);
    let centers = kmeans(&training, plan.target_color_count as usize);
    let palette: Vec<Rgba> = centers.iter().map(round_center).collect();

    let indices = if plan.dithering {
        dither(&image, &palette)
    } else {
        let lookup: HashMap<Rgba, u8> = ordered
            .iter()
            .map(|&(color, _)| (color, nearest(&palette, to_point(color))))
            .collect();
        image.colors().map(|c| lookup[&c]).collect()
    };

    let metadata = image.take_metadata();
    let (width, height) = image.dimensions();
    Ok(RawImage::indexed(width, height, palette, indices)?.with_metadata(metadata))
}

/// Guess a palette size from how many coarse color buckets the image spans.
///
/// Each channel is cut into 16 levels; the count of occupied buckets over a
/// bounded pixel sample is the estimate, capped at [`MAX_COLORS`].
pub fn estimate_color_count(image: &RawImage) -> u16 {
    let total = image.pixel_count();
    let step = total.div_ceil(MAX_SAMPLE).max(1);
    let buckets: HashSet<Rgba> = (0..total)
        .step_by(step)
        .map(|i| image.color_at(i).map(|channel| channel / 16))
        .collect();
    buckets.len().clamp(1, MAX_COLORS as usize) as u16
}

type Point = [f64; 4];

fn to_point(color: Rgba) -> Point {
    color.map(f64::from)
}

fn round_center(center: &Point) -> Rgba {
    center.map(|v| v.round().clamp(0.0, 255.0) as u8)
}

fn distance_sq(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn color_histogram(image: &RawImage) -> HashMap<Rgba, u64> {
    let mut counts = HashMap::new();
    for color in image.colors() {
        *counts.entry(color).or_insert(0u64) += 1;
    }
    counts
}

/// Most frequent first; equal counts ordered by color value.
fn frequency_order(histogram: HashMap<Rgba, u64>) -> Vec<(Rgba, u64)> {
    let mut ordered: Vec<(Rgba, u64)> = histogram.into_iter().collect();
    ordered.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ordered
}

/// Take `limit` entries at an even stride (all of them if there are fewer).
fn stride_sample<T: Copy>(items: &[T], limit: usize) -> Vec<T> {
    if items.len() <= limit {
        return items.to_vec();
    }
    (0..limit).map(|i| items[i * items.len() / limit]).collect()
}

/// Index of the nearest palette entry; equidistant entries resolve to the
/// lower index.
fn nearest_center(centers: &[Point], point: &Point) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = distance_sq(center, point);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

fn nearest(palette: &[Rgba], point: Point) -> u8 {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &color) in palette.iter().enumerate() {
        let d = distance_sq(&to_point(color), &point);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    // Palettes never exceed MAX_PALETTE_LEN entries
    best as u8
}

/// Weighted Lloyd iterations over `colors`, which must hold more than `k`
/// entries in frequency order.
fn kmeans(colors: &[(Rgba, u64)], k: usize) -> Vec<Point> {
    let points: Vec<(Point, f64)> = colors
        .iter()
        .map(|&(color, count)| (to_point(color), count as f64))
        .collect();

    let mut centers: Vec<Point> = stride_sample(&points, k).into_iter().map(|(p, _)| p).collect();

    for iteration in 0..MAX_ITERATIONS {
        let mut sums = vec![[0.0f64; 4]; k];
        let mut weights = vec![0.0f64; k];
        for (point, weight) in &points {
            let c = nearest_center(&centers, point);
            for axis in 0..4 {
                sums[c][axis] += point[axis] * weight;
            }
            weights[c] += weight;
        }

        let mut movement = 0.0f64;
        for (c, center) in centers.iter_mut().enumerate() {
            // Empty clusters keep their previous center
            if weights[c] == 0.0 {
                continue;
            }
            let updated = sums[c].map(|s| s / weights[c]);
            movement = movement.max(distance_sq(center, &updated));
            *center = updated;
        }

        if movement < CONVERGENCE_THRESHOLD {
            log::trace!("k-means converged after {} iterations", iteration + 1);
            break;
        }
    }

    centers
}

/// Floyd–Steinberg error diffusion onto a fixed palette.
///
/// Kernel: right 7/16, bottom-left 3/16, bottom 5/16, bottom-right 1/16.
fn dither(image: &RawImage, palette: &[Rgba]) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut buffer: Vec<[f32; 4]> = image.colors().map(|c| c.map(f32::from)).collect();
    let mut indices = vec![0u8; buffer.len()];
    let mut cache: HashMap<Rgba, u8> = HashMap::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let current = buffer[idx].map(|v| v.round().clamp(0.0, 255.0) as u8);
            let chosen = *cache
                .entry(current)
                .or_insert_with(|| nearest(palette, to_point(current)));
            indices[idx] = chosen;

            let target = palette[chosen as usize];
            let error: [f32; 4] = std::array::from_fn(|axis| buffer[idx][axis] - target[axis] as f32);

            let mut diffuse = |ti: usize, fraction: f32| {
                for axis in 0..4 {
                    buffer[ti][axis] += error[axis] * fraction;
                }
            };
            if x + 1 < width {
                diffuse(idx + 1, 7.0 / 16.0);
            }
            if y + 1 < height {
                if x > 0 {
                    diffuse(idx + width - 1, 3.0 / 16.0);
                }
                diffuse(idx + width, 5.0 / 16.0);
                if x + 1 < width {
                    diffuse(idx + width + 1, 1.0 / 16.0);
                }
            }
        }
    }

    indices
}
