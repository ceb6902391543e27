//! Codec collaborator traits and shared error type.
//!
//! The pipeline never touches a codec directly. Two traits sit at the seam:
//!
//! | Trait | Operations |
//! |---|---|
//! | [`ImagingBackend`] | decode, resample, encode |
//! | [`MetadataCodec`] | read_metadata, write_metadata |
//!
//! The production implementations are
//! [`RustBackend`](super::rust_backend::RustBackend) (the `image` and `png`
//! crates) and [`ExifCodec`](super::rust_backend::ExifCodec). Tests use the
//! [`MockBackend`](tests::MockBackend) below, which implements both.

use super::exif_codec::MetadataError;
use super::params::{FileFormat, FormatDecision};
use crate::metadata::MetadataBag;
use crate::types::{ImageLayoutError, RawImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),
    #[error("resample failed: {0}")]
    Resample(String),
    #[error("{format} encode failed: {reason}")]
    Encode { format: FileFormat, reason: String },
    #[error("invalid pixel layout: {0}")]
    Layout(#[from] ImageLayoutError),
}

/// Pixel codec and resampler.
///
/// `Sync` so one backend can serve every rayon worker in a batch.
pub trait ImagingBackend: Sync {
    /// Decode the first frame of an encoded image and report its container.
    fn decode(&self, bytes: &[u8]) -> Result<(RawImage, FileFormat), BackendError>;

    /// Resample to exactly `width`×`height`. Metadata travels with the image.
    fn resample(&self, image: RawImage, width: u32, height: u32) -> Result<RawImage, BackendError>;

    /// Encode according to `decision`; `source` resolves `Container::Unchanged`.
    fn encode(
        &self,
        image: &RawImage,
        decision: &FormatDecision,
        source: FileFormat,
    ) -> Result<Vec<u8>, BackendError>;
}

/// Reads and writes embedded metadata in encoded byte streams.
pub trait MetadataCodec: Sync {
    fn read_metadata(&self, bytes: &[u8]) -> Result<MetadataBag, MetadataError>;

    /// Embed `metadata` into `encoded`, replacing whatever it already carries.
    fn write_metadata(&self, encoded: Vec<u8>, metadata: &MetadataBag) -> Result<Vec<u8>, MetadataError>;
}
