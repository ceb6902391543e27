//! Pure Rust codec backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF, BMP, TIFF) | `image::ImageReader` with guessed format |
//! | Resample | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG (truecolor) | `image::codecs::png::PngEncoder`, best compression |
//! | Encode → PNG (indexed) | `png::Encoder` with `PLTE` + `tRNS` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → GIF, BMP, TIFF | `DynamicImage::write_to` |
//! | EXIF read/write | custom [`exif_codec`](super::exif_codec) |

use super::backend::{BackendError, ImagingBackend, MetadataCodec};
use super::exif_codec::{self, MetadataError};
use super::params::{FileFormat, FormatDecision, Quality};
use crate::metadata::MetadataBag;
use crate::types::{ColorMode, ImageLayoutError, RawImage};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Opaque background used when a lossy target cannot store alpha.
const JPEG_MATTE: [u8; 3] = [255, 255, 255];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn file_format(format: ImageFormat) -> Result<FileFormat, BackendError> {
    match format {
        ImageFormat::Jpeg => Ok(FileFormat::Jpeg),
        ImageFormat::Png => Ok(FileFormat::Png),
        ImageFormat::WebP => Ok(FileFormat::WebP),
        ImageFormat::Gif => Ok(FileFormat::Gif),
        ImageFormat::Bmp => Ok(FileFormat::Bmp),
        ImageFormat::Tiff => Ok(FileFormat::Tiff),
        other => Err(BackendError::UnsupportedFormat(format!("{other:?}"))),
    }
}

/// Normalize any decoded layout into one the pipeline understands.
///
/// 8-bit gray, RGB and RGBA pass straight through; gray+alpha, 16-bit and
/// float layouts are converted down to 8-bit RGB(A), or to 8-bit gray when
/// there is no alpha.
fn into_raw(img: DynamicImage) -> Result<RawImage, ImageLayoutError> {
    let (width, height) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(buf) => RawImage::new(width, height, ColorMode::Grayscale, buf.into_raw()),
        DynamicImage::ImageLuma16(_) => {
            RawImage::new(width, height, ColorMode::Grayscale, img.to_luma8().into_raw())
        }
        DynamicImage::ImageRgb8(buf) => RawImage::new(width, height, ColorMode::Rgb, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => RawImage::new(width, height, ColorMode::Rgba, buf.into_raw()),
        other if other.color().has_alpha() => {
            RawImage::new(width, height, ColorMode::Rgba, other.to_rgba8().into_raw())
        }
        other => RawImage::new(width, height, ColorMode::Rgb, other.to_rgb8().into_raw()),
    }
}

fn buffer_mismatch(image: &RawImage) -> ImageLayoutError {
    ImageLayoutError::BufferLength {
        expected: image.pixel_count() * image.mode().channels(),
        actual: image.pixels().len(),
    }
}

/// View a [`RawImage`] as a `DynamicImage`. Indexed images are expanded.
fn to_dynamic(image: &RawImage) -> Result<DynamicImage, ImageLayoutError> {
    let (w, h) = image.dimensions();
    let dynamic = match image.mode() {
        ColorMode::Grayscale => image::GrayImage::from_raw(w, h, image.pixels().to_vec()).map(DynamicImage::ImageLuma8),
        ColorMode::Rgb => image::RgbImage::from_raw(w, h, image.pixels().to_vec()).map(DynamicImage::ImageRgb8),
        ColorMode::Rgba => image::RgbaImage::from_raw(w, h, image.pixels().to_vec()).map(DynamicImage::ImageRgba8),
        ColorMode::Indexed => image::RgbaImage::from_raw(w, h, image.to_rgba8()).map(|buf| {
            let expanded = DynamicImage::ImageRgba8(buf);
            if image.has_alpha() {
                expanded
            } else {
                DynamicImage::ImageRgb8(expanded.to_rgb8())
            }
        }),
    };
    dynamic.ok_or_else(|| buffer_mismatch(image))
}

fn encode_error(format: FileFormat) -> impl Fn(image::ImageError) -> BackendError {
    move |e| BackendError::Encode {
        format,
        reason: e.to_string(),
    }
}

fn encode_jpeg(image: &RawImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.value() as u8);
    let (w, h) = image.dimensions();

    if image.mode() == ColorMode::Grayscale {
        encoder
            .write_image(image.pixels(), w, h, ExtendedColorType::L8)
            .map_err(encode_error(FileFormat::Jpeg))?;
        return Ok(out);
    }

    // JPEG has no alpha channel
    let flat = image.clone().flatten(JPEG_MATTE);
    let rgb = match flat.mode() {
        ColorMode::Rgb => flat.pixels().to_vec(),
        _ => to_dynamic(&flat)?.to_rgb8().into_raw(),
    };
    encoder
        .write_image(&rgb, w, h, ExtendedColorType::Rgb8)
        .map_err(encode_error(FileFormat::Jpeg))?;
    Ok(out)
}

fn encode_png(image: &RawImage) -> Result<Vec<u8>, BackendError> {
    let (layout, bytes) = match image.mode() {
        ColorMode::Indexed => return encode_indexed_png(image),
        ColorMode::Grayscale => (ExtendedColorType::L8, image.pixels().to_vec()),
        ColorMode::Rgb => (ExtendedColorType::Rgb8, image.pixels().to_vec()),
        ColorMode::Rgba => (ExtendedColorType::Rgba8, image.pixels().to_vec()),
    };
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, image::codecs::png::FilterType::Adaptive)
        .write_image(&bytes, image.width(), image.height(), layout)
        .map_err(encode_error(FileFormat::Png))?;
    Ok(out)
}

/// Write an 8-bit palette PNG. `tRNS` is emitted only up to the last
/// translucent entry; the rest default to opaque.
fn encode_indexed_png(image: &RawImage) -> Result<Vec<u8>, BackendError> {
    let png_error = |e: png::EncodingError| BackendError::Encode {
        format: FileFormat::Png,
        reason: e.to_string(),
    };
    let palette = image.palette();
    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);
        encoder.set_palette(plte);
        if let Some(last) = palette.iter().rposition(|c| c[3] < 255) {
            let trns: Vec<u8> = palette[..=last].iter().map(|c| c[3]).collect();
            encoder.set_trns(trns);
        }
        let mut writer = encoder.write_header().map_err(png_error)?;
        writer.write_image_data(image.pixels()).map_err(png_error)?;
        writer.finish().map_err(png_error)?;
    }
    Ok(out)
}

fn encode_webp(image: &RawImage) -> Result<Vec<u8>, BackendError> {
    let (layout, bytes) = match image.mode() {
        ColorMode::Rgb => (ExtendedColorType::Rgb8, image.pixels().to_vec()),
        ColorMode::Rgba => (ExtendedColorType::Rgba8, image.pixels().to_vec()),
        ColorMode::Grayscale | ColorMode::Indexed => {
            let expanded = to_dynamic(image)?;
            if image.has_alpha() {
                (ExtendedColorType::Rgba8, expanded.to_rgba8().into_raw())
            } else {
                (ExtendedColorType::Rgb8, expanded.to_rgb8().into_raw())
            }
        }
    };
    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out)
        .write_image(&bytes, image.width(), image.height(), layout)
        .map_err(encode_error(FileFormat::WebP))?;
    Ok(out)
}

/// GIF, BMP and TIFF: written back in their own container.
fn encode_passthrough(image: &RawImage, format: FileFormat) -> Result<Vec<u8>, BackendError> {
    let target = match format {
        FileFormat::Gif => ImageFormat::Gif,
        FileFormat::Bmp => ImageFormat::Bmp,
        FileFormat::Tiff => ImageFormat::Tiff,
        FileFormat::Jpeg => ImageFormat::Jpeg,
        FileFormat::Png => ImageFormat::Png,
        FileFormat::WebP => ImageFormat::WebP,
    };
    let mut dynamic = to_dynamic(image)?;
    // The GIF encoder only takes RGB(A)
    if format == FileFormat::Gif && image.mode() == ColorMode::Grayscale {
        dynamic = DynamicImage::ImageRgb8(dynamic.to_rgb8());
    }
    let mut out = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut out, target)
        .map_err(encode_error(format))?;
    Ok(out.into_inner())
}

impl ImagingBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<(RawImage, FileFormat), BackendError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| BackendError::UnsupportedFormat("unrecognized signature".to_string()))
            .and_then(file_format)?;
        let img = reader
            .decode()
            .map_err(|e| BackendError::Decode(format!("{format}: {e}")))?;
        Ok((into_raw(img)?, format))
    }

    fn resample(&self, mut image: RawImage, width: u32, height: u32) -> Result<RawImage, BackendError> {
        if image.dimensions() == (width, height) {
            return Ok(image);
        }
        if width == 0 || height == 0 {
            return Err(BackendError::Resample(format!("invalid target {width}x{height}")));
        }
        let metadata = image.take_metadata();
        let resized = to_dynamic(&image)?.resize_exact(width, height, FilterType::Lanczos3);
        Ok(into_raw(resized)?.with_metadata(metadata))
    }

    fn encode(
        &self,
        image: &RawImage,
        decision: &FormatDecision,
        source: FileFormat,
    ) -> Result<Vec<u8>, BackendError> {
        match decision.container.resolve(source) {
            FileFormat::Jpeg => encode_jpeg(image, decision.quality.unwrap_or_default()),
            FileFormat::Png => encode_png(image),
            FileFormat::WebP => encode_webp(image),
            other => encode_passthrough(image, other),
        }
    }
}

/// EXIF codec over JPEG, PNG and WebP streams.
///
/// Reading also understands TIFF files; writing into any other container
/// fails with [`MetadataError::UnsupportedContainer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifCodec;

impl MetadataCodec for ExifCodec {
    fn read_metadata(&self, bytes: &[u8]) -> Result<MetadataBag, MetadataError> {
        exif_codec::read_exif(bytes)
    }

    fn write_metadata(&self, encoded: Vec<u8>, metadata: &MetadataBag) -> Result<Vec<u8>, MetadataError> {
        exif_codec::write_exif(encoded, metadata)
    }
}
