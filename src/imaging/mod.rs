//! Codecs and codec-adjacent math, pure Rust and statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (first frame only) |
//! | **Resample** | Lanczos3 via `resize_exact` |
//! | **Encode** | JPEG / PNG / lossless WebP via `image`, indexed PNG via `png` |
//! | **EXIF** | custom TIFF-IFD codec + JPEG/PNG/WebP splicing |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and quality math (unit testable)
//! - **Parameters**: Data structures describing an encode
//! - **Backend**: [`ImagingBackend`] / [`MetadataCodec`] traits + [`RustBackend`] / [`ExifCodec`]
//! - **EXIF codec**: byte-level metadata reader/writer

pub mod backend;
mod calculations;
pub mod exif_codec;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImagingBackend, MetadataCodec};
pub use calculations::{ResizeConstraint, adaptive_quality, plan_resize};
pub use exif_codec::MetadataError;
pub use params::{Container, FileFormat, FormatDecision, Quality, UnknownFormat};
pub use rust_backend::{ExifCodec, RustBackend, supported_input_extensions};
