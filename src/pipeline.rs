//! The size-reduction pipeline.
//!
//! One image moves through five stages, strictly in order and never retried:
//!
//! ```text
//! Decoded → Resized → (Quantized | skipped) → MetadataResolved → Encoded
//! ```
//!
//! | Stage | Work |
//! |---|---|
//! | Decoded | decode pixels, read embedded metadata (unreadable → empty) |
//! | Resized | plan + resample; identity plans skip the filter; optional flattening |
//! | Quantized | palette reduction, only when the target can hold a palette |
//! | MetadataResolved | apply the keep/override policy |
//! | Encoded | pick a container, encode, splice metadata back in |
//!
//! Any failure aborts the run. [`ShrinkPipeline::shrink_file`] writes the
//! destination only once the complete output exists in memory, through a
//! sibling temp file and a rename.

use crate::config::ShrinkConfig;
use crate::format::{self, SelectionHints};
use crate::imaging::{
    BackendError, FileFormat, FormatDecision, ImagingBackend, MetadataCodec, MetadataError, plan_resize,
};
use crate::metadata::{MetadataBag, MetadataPolicy};
use crate::quantize::{self, QuantizationPlan};
use crate::types::{ImageLayoutError, RawImage};
use log::{debug, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShrinkError {
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },
    #[error("decode failed: {0}")]
    Decode(#[source] BackendError),
    #[error("resample failed in {stage} stage: {source}")]
    Resample { stage: Stage, source: BackendError },
    #[error("{container} encode failed: {source}")]
    Encode {
        container: FileFormat,
        source: BackendError,
    },
    #[error("metadata codec error: {0}")]
    MetadataCodec(#[from] MetadataError),
    #[error("invalid pixel layout: {0}")]
    Layout(#[from] ImageLayoutError),
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Decoded,
    Resized,
    Quantized,
    MetadataResolved,
    Encoded,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Decoded => "decode",
            Stage::Resized => "resize",
            Stage::Quantized => "quantize",
            Stage::MetadataResolved => "metadata",
            Stage::Encoded => "encode",
        })
    }
}

/// What one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkOutcome {
    pub source_format: FileFormat,
    pub output_format: FileFormat,
    pub decision: FormatDecision,
    pub source_dimensions: (u32, u32),
    pub output_dimensions: (u32, u32),
    /// Palette size when the image was quantized.
    pub palette_len: Option<usize>,
    /// Metadata written into the output.
    pub metadata: MetadataBag,
    /// Stages that ran, in order. `Quantized` is absent when skipped.
    pub stages: Vec<Stage>,
    pub input_size: usize,
    /// The encoded output.
    pub bytes: Vec<u8>,
}

impl ShrinkOutcome {
    pub fn output_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Runs images through the stages with a fixed configuration.
///
/// Holds only immutable state and `Sync` collaborators, so one pipeline can
/// be shared by every worker of a batch.
pub struct ShrinkPipeline<'a, B: ImagingBackend, C: MetadataCodec> {
    config: ShrinkConfig,
    policy: MetadataPolicy,
    hints: SelectionHints,
    backend: &'a B,
    codec: &'a C,
}

impl<'a, B: ImagingBackend, C: MetadataCodec> ShrinkPipeline<'a, B, C> {
    /// Validates `config` up front; nothing runs with a bad configuration.
    pub fn new(config: ShrinkConfig, backend: &'a B, codec: &'a C) -> Result<Self, ShrinkError> {
        config.validate()?;
        Ok(Self {
            policy: config.metadata_policy(),
            hints: config.selection_hints(),
            config,
            backend,
            codec,
        })
    }

    pub fn config(&self) -> &ShrinkConfig {
        &self.config
    }

    /// Shrink one encoded image held in memory.
    pub fn shrink(&self, bytes: &[u8]) -> Result<ShrinkOutcome, ShrinkError> {
        let mut stages = Vec::with_capacity(5);
        let input_size = bytes.len();

        let (image, source_format) = self.backend.decode(bytes).map_err(ShrinkError::Decode)?;
        let original = self.read_metadata(bytes);
        let image = image.with_metadata(original);
        let source_dimensions = image.dimensions();
        debug!(
            "decoded {source_format} {}x{} ({}), {} metadata fields",
            source_dimensions.0,
            source_dimensions.1,
            image.mode(),
            image.metadata().len()
        );
        stages.push(Stage::Decoded);

        let image = self.resize(image)?;
        stages.push(Stage::Resized);

        let (mut image, palette_len) = self.reduce_palette(image, source_format)?;
        if palette_len.is_some() {
            stages.push(Stage::Quantized);
        }

        let metadata = self.policy.resolve(&image.take_metadata());
        debug!("resolved {} metadata fields", metadata.len());
        stages.push(Stage::MetadataResolved);

        let decision = format::select(&image, source_format, &self.hints);
        let output_format = decision.container.resolve(source_format);
        let encoded = self
            .backend
            .encode(&image, &decision, source_format)
            .map_err(|source| ShrinkError::Encode {
                container: output_format,
                source,
            })?;
        let (output, metadata) = self.embed_metadata(encoded, metadata, output_format)?;
        debug!(
            "encoded {output_format} (quality {:?}, palette {}): {} bytes",
            decision.quality.map(|q| q.value()),
            decision.palette_mode,
            output.len()
        );
        stages.push(Stage::Encoded);

        Ok(ShrinkOutcome {
            source_format,
            output_format,
            decision,
            source_dimensions,
            output_dimensions: image.dimensions(),
            palette_len,
            metadata,
            stages,
            input_size,
            bytes: output,
        })
    }

    /// Shrink `source` into `destination`.
    ///
    /// The destination is replaced atomically; on failure it is left as it
    /// was.
    pub fn shrink_file(&self, source: &Path, destination: &Path) -> Result<ShrinkOutcome, ShrinkError> {
        let input = fs::read(source).map_err(|e| io_error(source, e))?;
        let outcome = self.shrink(&input)?;
        write_output(destination, &outcome.bytes)?;
        Ok(outcome)
    }

    fn read_metadata(&self, bytes: &[u8]) -> MetadataBag {
        match self.codec.read_metadata(bytes) {
            Ok(bag) => bag,
            Err(e) => {
                warn!("ignoring unreadable metadata: {e}");
                MetadataBag::new()
            }
        }
    }

    fn resize(&self, image: RawImage) -> Result<RawImage, ShrinkError> {
        let (width, height) = image.dimensions();
        let (target_w, target_h) = plan_resize(width, height, &self.config.resize_constraint());

        let mut image = if (target_w, target_h) == (width, height) {
            debug!("resize: {width}x{height} already fits");
            image
        } else {
            debug!("resize: {width}x{height} → {target_w}x{target_h}");
            self.backend
                .resample(image, target_w, target_h)
                .map_err(|source| ShrinkError::Resample {
                    stage: Stage::Resized,
                    source,
                })?
        };

        if let Some(background) = self.config.background() {
            image = image.flatten(background);
        }
        Ok(image)
    }

    /// The plan for this image, if palette reduction is configured at all.
    fn quantization_plan(&self, image: &RawImage) -> Option<QuantizationPlan> {
        let palette = &self.config.palette;
        let count = match palette.target_color_count {
            Some(count) => count,
            None if palette.estimate_colors => {
                let estimate = quantize::estimate_color_count(image);
                debug!("estimated {estimate} colors");
                estimate
            }
            None => return None,
        };
        Some(QuantizationPlan::new(count, palette.dithering))
    }

    /// Whether the container this run will produce can store a palette.
    ///
    /// A forced container is resolved against the source first, so
    /// `unchanged` on a PNG source still quantizes.
    fn palette_allowed(&self, source_format: FileFormat) -> bool {
        match self.hints.forced {
            Some(container) => container.resolve(source_format).supports_palette(),
            None => !self.hints.prefer_webp && source_format.is_web_format(),
        }
    }

    fn reduce_palette(
        &self,
        image: RawImage,
        source_format: FileFormat,
    ) -> Result<(RawImage, Option<usize>), ShrinkError> {
        let Some(plan) = self.quantization_plan(&image) else {
            return Ok((image, None));
        };
        if !self.palette_allowed(source_format) {
            debug!("quantize: skipped, output container cannot hold a palette");
            return Ok((image, None));
        }
        let distinct = image.distinct_colors();
        if !quantize::should_quantize(distinct, plan.target_color_count, image.mode()) {
            debug!(
                "quantize: skipped, {distinct} colors in {} image fits {}",
                image.mode(),
                plan.target_color_count
            );
            return Ok((image, None));
        }

        let reduced = quantize::quantize(image, &plan)?;
        let palette_len = reduced.palette().len();
        debug!("quantize: {distinct} → {palette_len} palette entries");
        Ok((reduced, Some(palette_len)))
    }

    /// Write `metadata` into the encoded stream when there is anything to
    /// write and the container can carry it. Returns the bytes and the bag
    /// that actually made it into the output.
    fn embed_metadata(
        &self,
        encoded: Vec<u8>,
        metadata: MetadataBag,
        output_format: FileFormat,
    ) -> Result<(Vec<u8>, MetadataBag), ShrinkError> {
        if metadata.is_empty() {
            return Ok((encoded, metadata));
        }
        if !output_format.carries_exif() {
            warn!(
                "dropping {} metadata fields: {output_format} output cannot carry EXIF",
                metadata.len()
            );
            return Ok((encoded, MetadataBag::new()));
        }
        let bytes = self.codec.write_metadata(encoded, &metadata)?;
        Ok((bytes, metadata))
    }
}

/// Replace `destination` with `bytes` through a sibling temp file and a
/// rename. On failure the destination is untouched and the temp file is
/// removed.
pub fn write_output(destination: &Path, bytes: &[u8]) -> Result<(), ShrinkError> {
    let temp = temp_path(destination);
    let written = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp)
        .and_then(|mut file| file.write_all(bytes));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(io_error(&temp, e));
    }
    if let Err(e) = fs::rename(&temp, destination) {
        let _ = fs::remove_file(&temp);
        return Err(io_error(destination, e));
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ShrinkError {
    ShrinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Hidden sibling of `destination`, so the final rename stays on one
/// filesystem. Unique per process and per call.
fn temp_path(destination: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let serial = NEXT.fetch_add(1, Ordering::Relaxed);
    destination.with_file_name(format!(".{name}.{}.{serial}.tmp", std::process::id()))
}
