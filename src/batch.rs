//! Batch mode: find images, shrink them in parallel, report.
//!
//! ```text
//! discover(paths) ──► [SourceImage] ──► run_batch (rayon) ──► BatchReport
//!                                            │
//!                                            └─ BatchEvent ──► mpsc ──► printer
//! ```
//!
//! Directories are walked recursively and filtered to extensions with a
//! compiled-in decoder. Explicitly named files are taken as given.
//!
//! ## Placement
//!
//! - [`Placement::Directory`] mirrors each image's path (relative to the
//!   argument it was found under) into the output directory.
//! - [`Placement::InPlace`] writes next to the source and removes the source
//!   when the output name differs (`photo.png` → `photo.jpeg`).
//!
//! Output names carry the extension of the container actually written, see
//! [`export_name`]. A failing image is reported and the rest of the batch
//! carries on.
//!
//! Each destination is claimed once per batch: a second image resolving to
//! the same output (`photo.png` and `photo.jpeg` both becoming
//! `photo.jpeg`) fails instead of overwriting the first, and no output may
//! replace another input image.

use crate::imaging::{FileFormat, ImagingBackend, MetadataCodec, supported_input_extensions};
use crate::pipeline::{ShrinkError, ShrinkPipeline, write_output};
use log::debug;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("input not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to write report {path}: {source}")]
    Report { path: PathBuf, source: std::io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Shrink(#[from] ShrinkError),
    #[error("output {0} is already written by another image in this batch")]
    DestinationTaken(PathBuf),
    #[error("output {0} would replace another input image")]
    ReplacesInput(PathBuf),
}

/// One discovered input image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    /// Path relative to the command-line argument it was found under.
    pub relative: PathBuf,
}

/// Where outputs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Directory(PathBuf),
    InPlace,
}

impl Placement {
    /// Destination for `source` once its output container is known.
    pub fn destination(&self, source: &SourceImage, format: FileFormat) -> PathBuf {
        match self {
            Placement::Directory(root) => export_name(&root.join(&source.relative), format),
            Placement::InPlace => export_name(&source.path, format),
        }
    }
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { total: usize },
    Shrunk { index: usize, image: ShrunkImage },
    Failed { index: usize, failure: FailedImage },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShrunkImage {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub source_format: FileFormat,
    pub output_format: FileFormat,
    pub source_dimensions: (u32, u32),
    pub output_dimensions: (u32, u32),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette_len: Option<usize>,
    pub input_size: u64,
    pub output_size: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl ShrunkImage {
    /// Output size as a fraction of the input size.
    pub fn ratio(&self) -> f64 {
        if self.input_size == 0 {
            return 1.0;
        }
        self.output_size as f64 / self.input_size as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedImage {
    pub source: PathBuf,
    pub error: String,
}

/// Summary of a finished batch, serializable with `--report`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub shrunk: Vec<ShrunkImage>,
    pub failed: Vec<FailedImage>,
    pub total_input_size: u64,
    pub total_output_size: u64,
}

impl BatchReport {
    fn from_results(results: Vec<Result<ShrunkImage, FailedImage>>) -> Self {
        let mut report = BatchReport::default();
        for result in results {
            match result {
                Ok(image) => {
                    report.total_input_size += image.input_size;
                    report.total_output_size += image.output_size;
                    report.shrunk.push(image);
                }
                Err(failure) => report.failed.push(failure),
            }
        }
        report
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn write_json(&self, path: &Path) -> Result<(), BatchError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| BatchError::Report {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn serialize_secs<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// `path` with the extension of `format`.
///
/// An extension that already names the same format is kept, so `photo.jpg`
/// stays `photo.jpg` when re-encoded as JPEG.
pub fn export_name(path: &Path, format: FileFormat) -> PathBuf {
    let current = path.extension().map(|e| e.to_string_lossy().to_lowercase());
    if current.as_deref().and_then(format_for_extension) == Some(format) {
        return path.to_path_buf();
    }
    path.with_extension(format.extension())
}

fn format_for_extension(ext: &str) -> Option<FileFormat> {
    match ext {
        "jpg" | "jpeg" => Some(FileFormat::Jpeg),
        "png" => Some(FileFormat::Png),
        "webp" => Some(FileFormat::WebP),
        "gif" => Some(FileFormat::Gif),
        "bmp" => Some(FileFormat::Bmp),
        "tif" | "tiff" => Some(FileFormat::Tiff),
        _ => None,
    }
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    supported_input_extensions().contains(&ext.as_str())
}

/// Expand files and directories into the list of images to shrink.
///
/// Directory contents are visited in file-name order so runs are
/// reproducible.
pub fn discover(inputs: &[PathBuf]) -> Result<Vec<SourceImage>, BatchError> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_file() {
            let relative = input.file_name().map(PathBuf::from).unwrap_or_else(|| input.clone());
            sources.push(SourceImage {
                path: input.clone(),
                relative,
            });
            continue;
        }
        if !input.is_dir() {
            return Err(BatchError::NotFound(input.clone()));
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(input)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
            sources.push(SourceImage {
                path: entry.into_path(),
                relative,
            });
        }
    }
    debug!("discovered {} images", sources.len());
    Ok(sources)
}

/// Output paths handed out during one batch.
struct Destinations {
    inputs: HashSet<PathBuf>,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl Destinations {
    fn new(sources: &[SourceImage]) -> Self {
        Self {
            inputs: sources.iter().map(|s| s.path.clone()).collect(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve `destination` for `source`. Only the source itself may be
    /// overwritten by its own output.
    fn claim(&self, destination: &Path, source: &Path) -> Result<(), BatchError> {
        if destination != source && self.inputs.contains(destination) {
            return Err(BatchError::ReplacesInput(destination.to_path_buf()));
        }
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(destination.to_path_buf()) {
            return Err(BatchError::DestinationTaken(destination.to_path_buf()));
        }
        Ok(())
    }
}

/// Shrink every source in parallel on the current rayon pool.
///
/// Results keep the order of `sources`; events arrive in completion order.
pub fn run_batch<B: ImagingBackend, C: MetadataCodec>(
    pipeline: &ShrinkPipeline<'_, B, C>,
    sources: &[SourceImage],
    placement: &Placement,
    events: Option<Sender<BatchEvent>>,
) -> BatchReport {
    if let Some(tx) = &events {
        tx.send(BatchEvent::Started { total: sources.len() }).ok();
    }

    let destinations = Destinations::new(sources);
    let results: Vec<Result<ShrunkImage, FailedImage>> = sources
        .par_iter()
        .enumerate()
        .map_with(events, |events, (index, source)| {
            let result = shrink_one(pipeline, source, placement, &destinations).map_err(|e| FailedImage {
                source: source.path.clone(),
                error: e.to_string(),
            });
            if let Some(tx) = events {
                let event = match &result {
                    Ok(image) => BatchEvent::Shrunk {
                        index,
                        image: image.clone(),
                    },
                    Err(failure) => BatchEvent::Failed {
                        index,
                        failure: failure.clone(),
                    },
                };
                tx.send(event).ok();
            }
            result
        })
        .collect();

    BatchReport::from_results(results)
}

fn shrink_one<B: ImagingBackend, C: MetadataCodec>(
    pipeline: &ShrinkPipeline<'_, B, C>,
    source: &SourceImage,
    placement: &Placement,
    destinations: &Destinations,
) -> Result<ShrunkImage, BatchError> {
    let start = Instant::now();
    let input = fs::read(&source.path).map_err(io(&source.path))?;
    let outcome = pipeline.shrink(&input)?;

    let destination = placement.destination(source, outcome.output_format);
    destinations.claim(&destination, &source.path)?;
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io(parent))?;
    }
    write_output(&destination, &outcome.bytes)?;
    if *placement == Placement::InPlace && destination != source.path {
        fs::remove_file(&source.path).map_err(io(&source.path))?;
    }

    Ok(ShrunkImage {
        source: source.path.clone(),
        destination,
        source_format: outcome.source_format,
        output_format: outcome.output_format,
        source_dimensions: outcome.source_dimensions,
        output_dimensions: outcome.output_dimensions,
        palette_len: outcome.palette_len,
        input_size: outcome.input_size as u64,
        output_size: outcome.output_size() as u64,
        elapsed: start.elapsed(),
    })
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ShrinkError {
    let path = path.to_path_buf();
    move |source| ShrinkError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShrinkConfig;
    use crate::imaging::backend::tests::MockBackend;
    use crate::types::{ColorMode, RawImage};
    use std::sync::Mutex;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn photo() -> RawImage {
        let pixels = (0..16 * 16 * 3).map(|i| (i % 251) as u8).collect();
        RawImage::new(16, 16, ColorMode::Rgb, pixels).unwrap()
    }

    fn backend_for(count: usize, format: FileFormat) -> MockBackend {
        MockBackend {
            decode_results: Mutex::new((0..count).map(|_| (photo(), format)).collect()),
            ..MockBackend::default()
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"not really an image").unwrap();
    }

    // =========================================================================
    // export_name
    // =========================================================================

    #[test]
    fn export_name_swaps_extension() {
        assert_eq!(
            export_name(Path::new("a/photo.png"), FileFormat::Jpeg),
            PathBuf::from("a/photo.jpeg")
        );
        assert_eq!(
            export_name(Path::new("photo.JPG"), FileFormat::WebP),
            PathBuf::from("photo.webp")
        );
    }

    #[test]
    fn export_name_keeps_equivalent_extension() {
        assert_eq!(export_name(Path::new("photo.jpg"), FileFormat::Jpeg), PathBuf::from("photo.jpg"));
        assert_eq!(export_name(Path::new("scan.TIF"), FileFormat::Tiff), PathBuf::from("scan.TIF"));
    }

    #[test]
    fn placement_mirrors_relative_path() {
        let source = SourceImage {
            path: PathBuf::from("in/trip/day1.png"),
            relative: PathBuf::from("trip/day1.png"),
        };
        let dir = Placement::Directory(PathBuf::from("out"));
        assert_eq!(dir.destination(&source, FileFormat::Jpeg), PathBuf::from("out/trip/day1.jpeg"));
        assert_eq!(
            Placement::InPlace.destination(&source, FileFormat::Png),
            PathBuf::from("in/trip/day1.png")
        );
    }

    // =========================================================================
    // discover
    // =========================================================================

    #[test]
    fn discover_walks_directories_in_name_order() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("photos");
        touch(&root.join("b.png"));
        touch(&root.join("a.JPG"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested/c.webp"));

        let found = discover(&[root.clone()]).unwrap();
        let relative: Vec<_> = found.iter().map(|s| s.relative.clone()).collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.JPG"),
                PathBuf::from("b.png"),
                PathBuf::from("nested/c.webp")
            ]
        );
        assert_eq!(found[2].path, root.join("nested/c.webp"));
    }

    #[test]
    fn discover_accepts_explicit_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("deep/one.gif");
        touch(&file);

        let found = discover(&[file.clone()]).unwrap();
        assert_eq!(
            found,
            vec![SourceImage {
                path: file,
                relative: PathBuf::from("one.gif"),
            }]
        );
    }

    #[test]
    fn discover_missing_input_errors() {
        let tmp = TempDir::new().unwrap();
        let result = discover(&[tmp.path().join("nope")]);
        assert!(matches!(result, Err(BatchError::NotFound(_))));
    }

    // =========================================================================
    // run_batch
    // =========================================================================

    #[test]
    fn batch_writes_into_output_directory() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        touch(&input.join("a.png"));
        touch(&input.join("sub/b.png"));
        let out = tmp.path().join("out");

        let backend = backend_for(2, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[input.clone()]).unwrap();
        let report = run_batch(&pipeline, &sources, &Placement::Directory(out.clone()), None);

        assert!(!report.has_failures());
        assert_eq!(report.shrunk.len(), 2);
        assert_eq!(fs::read(out.join("a.jpeg")).unwrap(), b"JPEG");
        assert_eq!(fs::read(out.join("sub/b.jpeg")).unwrap(), b"JPEG");
        assert!(input.join("a.png").exists());
        assert_eq!(report.total_output_size, 8);
    }

    #[test]
    fn in_place_replaces_source_when_name_changes() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("pic.png");
        touch(&source);

        let backend = backend_for(1, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[source.clone()]).unwrap();
        let report = run_batch(&pipeline, &sources, &Placement::InPlace, None);

        assert_eq!(report.shrunk[0].destination, tmp.path().join("pic.jpeg"));
        assert!(!source.exists());
        assert!(tmp.path().join("pic.jpeg").exists());
    }

    #[test]
    fn failures_are_reported_and_batch_continues() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        touch(&input.join("a.png"));
        touch(&input.join("b.png"));

        // Only one decodable image for two inputs.
        let backend = backend_for(1, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[input]).unwrap();
        let report = run_batch(&pipeline, &sources, &Placement::Directory(tmp.path().join("out")), None);

        assert_eq!(report.shrunk.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("decode failed"));
        assert!(report.has_failures());
    }

    #[test]
    fn events_announce_start_and_every_image() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        for name in ["a.png", "b.png", "c.png"] {
            touch(&input.join(name));
        }

        let backend = backend_for(3, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[input]).unwrap();
        let (tx, rx) = mpsc::channel();
        run_batch(&pipeline, &sources, &Placement::Directory(tmp.path().join("out")), Some(tx));

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events[0], BatchEvent::Started { total: 3 }));
        let mut indices: Vec<_> = events[1..]
            .iter()
            .map(|e| match e {
                BatchEvent::Shrunk { index, .. } => *index,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn clashing_outputs_fail_instead_of_overwriting() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        touch(&input.join("photo.png"));
        touch(&input.join("photo.jpeg"));
        let out = tmp.path().join("out");

        // Both decode to an opaque photo, so both become photo.jpeg
        let backend = backend_for(2, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[input]).unwrap();
        let report = run_batch(&pipeline, &sources, &Placement::Directory(out.clone()), None);

        assert_eq!(report.shrunk.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("already written"));
        assert_eq!(report.shrunk[0].destination, out.join("photo.jpeg"));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn in_place_never_replaces_another_input() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("pics");
        touch(&dir.join("photo.png"));
        touch(&dir.join("photo.jpeg"));

        let backend = backend_for(2, FileFormat::Png);
        let pipeline = ShrinkPipeline::new(ShrinkConfig::default(), &backend, &backend).unwrap();
        let sources = discover(&[dir.clone()]).unwrap();
        let report = run_batch(&pipeline, &sources, &Placement::InPlace, None);

        assert_eq!(report.shrunk.len(), 1);
        assert_eq!(report.shrunk[0].source, dir.join("photo.jpeg"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source, dir.join("photo.png"));
        assert!(report.failed[0].error.contains("replace another input"));
        // The losing source is left where it was
        assert!(dir.join("photo.png").exists());
    }

    #[test]
    fn destination_claims_are_exclusive() {
        let sources = vec![SourceImage {
            path: PathBuf::from("in/a.png"),
            relative: PathBuf::from("a.png"),
        }];
        let destinations = Destinations::new(&sources);
        assert!(destinations.claim(Path::new("out/a.jpeg"), Path::new("in/a.png")).is_ok());
        assert!(matches!(
            destinations.claim(Path::new("out/a.jpeg"), Path::new("in/b.png")),
            Err(BatchError::DestinationTaken(_))
        ));
        // A source may be replaced by its own output only
        assert!(destinations.claim(Path::new("in/a.png"), Path::new("in/a.png")).is_ok());
        assert!(matches!(
            Destinations::new(&sources).claim(Path::new("in/a.png"), Path::new("in/c.png")),
            Err(BatchError::ReplacesInput(_))
        ));
    }

    // =========================================================================
    // Report
    // =========================================================================

    #[test]
    fn report_serializes_to_json() {
        let tmp = TempDir::new().unwrap();
        let report = BatchReport {
            shrunk: vec![ShrunkImage {
                source: PathBuf::from("a.png"),
                destination: PathBuf::from("out/a.jpeg"),
                source_format: FileFormat::Png,
                output_format: FileFormat::Jpeg,
                source_dimensions: (2000, 1000),
                output_dimensions: (1000, 500),
                palette_len: None,
                input_size: 4000,
                output_size: 1000,
                elapsed: Duration::from_millis(1500),
            }],
            failed: vec![],
            total_input_size: 4000,
            total_output_size: 1000,
        };
        assert_eq!(report.shrunk[0].ratio(), 0.25);

        let path = tmp.path().join("report.json");
        report.write_json(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &value["shrunk"][0];
        assert_eq!(entry["output_format"], "jpeg");
        assert_eq!(entry["elapsed_secs"], 1.5);
        assert_eq!(entry["output_dimensions"], serde_json::json!([1000, 500]));
        assert!(entry.get("palette_len").is_none());
    }
}
