//! Shrink configuration.
//!
//! Handles loading, validating and merging `shrinkix.toml`. Configuration is
//! layered, each layer overriding the one below:
//!
//! ```text
//! stock defaults  ←  --config FILE  ←  command-line flags
//! ```
//!
//! Layers are merged as raw TOML values first, so a layer only needs the keys
//! it wants to change. The merged value is then deserialized (unknown keys are
//! rejected to catch typos early) and validated before any image is touched.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [resize]
//! # max_width = 1920       # Bounding box; omit a bound to leave that axis free
//! # max_height = 1080
//!
//! [palette]
//! # target_color_count = 128  # Reduce to at most this many colors (1-256)
//! estimate_colors = false     # Derive a color count when none is set
//! dithering = false           # Floyd-Steinberg error diffusion
//!
//! [metadata]
//! keep_metadata = false     # Keep EXIF from the source
//! # artist = "Jane Doe"     # Always written, replacing the source value
//! # copyright = "(c) 2025"
//!
//! [output]
//! # format = "webp"         # Force jpeg, png, webp or unchanged
//! # quality = 80            # Lossy quality (1-100)
//! adaptive_quality = false  # Size-driven quality when none is set
//! prefer_webp = false       # WebP for everything not forced otherwise
//! # background = "#ffffff" # Flatten transparency onto this color
//!
//! [processing]
//! # max_processes = 4       # Max parallel workers (omit for auto = CPU cores)
//! ```

use crate::format::SelectionHints;
use crate::imaging::{Container, Quality, ResizeConstraint};
use crate::metadata::{MetadataPolicy, overrides_from};
use crate::pipeline::ShrinkError;
use crate::quantize::MAX_COLORS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(#[from] ShrinkError),
}

/// Everything the pipeline and the batch driver need to know.
///
/// All fields have defaults; config files need only specify the values they
/// want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShrinkConfig {
    pub resize: ResizeConfig,
    pub palette: PaletteConfig,
    pub metadata: MetadataConfig,
    pub output: OutputConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// Palette reduction settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaletteConfig {
    /// Colors to reduce to. Absent means no reduction unless
    /// `estimate_colors` is on.
    pub target_color_count: Option<u16>,
    pub estimate_colors: bool,
    pub dithering: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    pub keep_metadata: bool,
    pub artist: Option<String>,
    pub copyright: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: Option<Container>,
    /// Explicit lossy quality, 1-100. Kept as a plain integer so that
    /// out-of-range values reach validation instead of being clamped.
    pub quality: Option<u32>,
    pub adaptive_quality: bool,
    pub prefer_webp: bool,
    /// `#rrggbb` (or `#rgb`) color to flatten transparency onto.
    pub background: Option<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ShrinkError {
    ShrinkError::InvalidConfiguration {
        field,
        reason: reason.into(),
    }
}

impl ShrinkConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ShrinkError> {
        if self.resize.max_width == Some(0) {
            return Err(invalid("resize.max_width", "must be at least 1"));
        }
        if self.resize.max_height == Some(0) {
            return Err(invalid("resize.max_height", "must be at least 1"));
        }
        if let Some(count) = self.palette.target_color_count {
            if count == 0 || count > MAX_COLORS {
                return Err(invalid(
                    "palette.target_color_count",
                    format!("must be 1-{MAX_COLORS}, got {count}"),
                ));
            }
        }
        if let Some(quality) = self.output.quality {
            if !(1..=100).contains(&quality) {
                return Err(invalid("output.quality", format!("must be 1-100, got {quality}")));
            }
        }
        if let Some(background) = &self.output.background {
            if parse_hex_color(background).is_none() {
                return Err(invalid(
                    "output.background",
                    format!("expected #rrggbb, got {background:?}"),
                ));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(invalid("processing.max_processes", "must be at least 1"));
        }
        Ok(())
    }

    pub fn resize_constraint(&self) -> ResizeConstraint {
        ResizeConstraint::new(self.resize.max_width, self.resize.max_height)
    }

    pub fn selection_hints(&self) -> SelectionHints {
        SelectionHints {
            forced: self.output.format,
            prefer_webp: self.output.prefer_webp,
            quality: self.output.quality.map(Quality::new),
            adaptive_quality: self.output.adaptive_quality,
        }
    }

    pub fn metadata_policy(&self) -> MetadataPolicy {
        let overrides = overrides_from(
            self.metadata.artist.as_deref(),
            self.metadata.copyright.as_deref(),
        );
        MetadataPolicy::new(self.metadata.keep_metadata, overrides)
    }

    /// Flattening color, if one is configured and well-formed.
    pub fn background(&self) -> Option<[u8; 3]> {
        self.output.background.as_deref().and_then(parse_hex_color)
    }
}

/// Parse `#rrggbb` or `#rgb` (the `#` is optional).
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?]),
        3 => {
            let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some([short(0)?, short(1)?, short(2)?])
        }
        _ => None,
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top. Absent options are simply
/// missing keys.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ShrinkConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// The file was named explicitly, so a missing file is an error.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<ShrinkConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: ShrinkConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Build the effective configuration: stock defaults, then the optional
/// config file, then `overrides` (typically built from CLI flags).
pub fn load_config(file: Option<&Path>, overrides: toml::Value) -> Result<ShrinkConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let mut layers = Vec::with_capacity(2);
    if let Some(path) = file {
        layers.push(load_raw_config(path)?);
    }
    layers.push(overrides);
    resolve_config(base, layers)
}

/// Returns a fully-commented stock `shrinkix.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# shrinkix configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Use with: shrinkix shrink --config shrinkix.toml <PATH>...
# Command-line flags override values from this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Resizing
# ---------------------------------------------------------------------------
[resize]
# Bounding box for the output. Images are scaled down to fit, keeping their
# aspect ratio, and are never scaled up. Omit a bound to leave that axis free.
# max_width = 1920
# max_height = 1080

# ---------------------------------------------------------------------------
# Palette reduction
# ---------------------------------------------------------------------------
[palette]
# Reduce truecolor images to at most this many colors (1-256). Only applied
# when the output container can hold a palette (PNG).
# target_color_count = 128

# Derive a color count from the image when target_color_count is not set.
estimate_colors = false

# Floyd-Steinberg error diffusion when mapping to the reduced palette.
dithering = false

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# Keep the source's EXIF (camera, timestamps, GPS, orientation...).
keep_metadata = false

# Always written to the output, replacing any source value.
# artist = "Jane Doe"
# copyright = "(c) 2025 Jane Doe"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Force a container: "jpeg", "png", "webp" or "unchanged".
# Omit to choose automatically (JPEG for photos, PNG for transparency and
# palettes, the source container for GIF/BMP/TIFF).
# format = "webp"

# Lossy (JPEG) quality, 1-100. Omit for the default of 80.
# quality = 80

# Pick JPEG quality from the output size when quality is not set:
# small images keep more detail, large ones compress harder.
adaptive_quality = false

# Write WebP (lossless) unless format forces something else.
prefer_webp = false

# Flatten transparency onto this color before encoding.
# background = "#ffffff"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
