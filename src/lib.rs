//! # shrinkix
//!
//! Shrink raster images for web delivery. One image goes in, a smaller one
//! comes out: bounded in size, optionally palette-reduced, re-encoded in the
//! most suitable web container, with metadata kept, dropped or overridden.
//!
//! # Architecture: One Linear Pipeline
//!
//! ```text
//! Decoded → Resized → (Quantized | skipped) → MetadataResolved → Encoded
//! ```
//!
//! Every stage is a plain function of its input plus the immutable
//! [`config::ShrinkConfig`]. The pipeline never writes a partial output: the
//! encoded bytes exist in full before any file is touched.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Stage orchestration, `ShrinkError`, atomic file output |
//! | [`quantize`] | k-means palette reduction with optional Floyd–Steinberg dithering |
//! | [`format`] | Output container, quality and palette-mode selection |
//! | [`metadata`] | Metadata bag and the keep/override policy |
//! | [`imaging`] | Resize planning, codec backends, EXIF reading and writing |
//! | [`types`] | `RawImage` pixel buffer shared by every stage |
//! | [`config`] | Layered `shrinkix.toml` loading, merging, validation |
//! | [`batch`] | Directory discovery, parallel runs, JSON report |
//! | [`output`] | CLI output formatting for batch progress and summaries |
//!
//! # Design Decisions
//!
//! ## Collaborators Behind Traits
//!
//! Decoding, resampling and encoding go through
//! [`imaging::ImagingBackend`]; EXIF goes through [`imaging::MetadataCodec`].
//! The pipeline logic is tested against a recording mock and never needs real
//! codecs to check stage order, quantization gating or metadata policy.
//!
//! ## Pure-Rust Codecs
//!
//! The [`imaging::RustBackend`] uses the `image` crate (Lanczos3 resampling,
//! JPEG/PNG/WebP/GIF/BMP/TIFF codecs) plus `png` for indexed output. EXIF
//! payloads are parsed and rebuilt with `kamadak-exif`; [`imaging::exif_codec`]
//! splices them into the containers. No system libraries.
//!
//! ## Orientation Is Metadata
//!
//! Pixels are never rotated. The orientation tag travels through the policy
//! like any other field, so viewers keep applying it.

pub mod batch;
pub mod config;
pub mod format;
pub mod imaging;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod quantize;
pub mod types;
