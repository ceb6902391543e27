//! End-to-end runs through the real codecs.
//!
//! Inputs are synthesized with the `image` crate, shrunk through the public
//! API and decoded again to check what actually landed in the output.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use shrinkix::batch::{self, Placement};
use shrinkix::config::ShrinkConfig;
use shrinkix::imaging::{Container, ExifCodec, FileFormat, ImagingBackend, MetadataCodec, RustBackend};
use shrinkix::metadata::{MetadataBag, MetadataField, MetadataValue};
use shrinkix::pipeline::{ShrinkPipeline, Stage};
use std::io::Cursor;
use tempfile::TempDir;

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// Smooth opaque gradient, the kind of content that should end up as JPEG.
fn photo_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn with_camera_exif(bytes: Vec<u8>) -> Vec<u8> {
    let bag: MetadataBag = [
        (MetadataField::Make, MetadataValue::text("Canon")),
        (MetadataField::Artist, MetadataValue::text("Someone Else")),
        (MetadataField::Orientation, MetadataValue::Short(6)),
    ]
    .into_iter()
    .collect();
    ExifCodec.write_metadata(bytes, &bag).unwrap()
}

#[test]
fn large_photo_becomes_bounded_jpeg_with_only_overrides() {
    let input = with_camera_exif(photo_png(2000, 1000));

    let mut config = ShrinkConfig::default();
    config.resize.max_width = Some(1000);
    config.resize.max_height = Some(1000);
    config.metadata.artist = Some("A".into());

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let outcome = pipeline.shrink(&input).unwrap();

    assert_eq!(outcome.source_format, FileFormat::Png);
    assert_eq!(outcome.output_format, FileFormat::Jpeg);
    assert_eq!(outcome.output_dimensions, (1000, 500));

    let decoded = image::load_from_memory(&outcome.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (1000, 500));

    let written = ExifCodec.read_metadata(&outcome.bytes).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written.text(&MetadataField::Artist), Some("A"));
}

#[test]
fn small_image_runs_every_stage_without_resampling() {
    let input = photo_png(40, 30);
    let mut config = ShrinkConfig::default();
    config.resize.max_width = Some(1000);
    config.resize.max_height = Some(1000);

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let outcome = pipeline.shrink(&input).unwrap();

    assert_eq!(outcome.output_dimensions, (40, 30));
    assert_eq!(
        outcome.stages,
        vec![Stage::Decoded, Stage::Resized, Stage::MetadataResolved, Stage::Encoded]
    );
    let (decoded, format) = backend.decode(&outcome.bytes).unwrap();
    assert_eq!(format, FileFormat::Jpeg);
    assert_eq!(decoded.dimensions(), (40, 30));
}

#[test]
fn kept_metadata_survives_with_orientation_untouched() {
    let input = with_camera_exif(photo_png(64, 32));
    let mut config = ShrinkConfig::default();
    config.metadata.keep_metadata = true;
    config.metadata.copyright = Some("(c) Studio".into());

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let outcome = pipeline.shrink(&input).unwrap();

    let written = ExifCodec.read_metadata(&outcome.bytes).unwrap();
    assert_eq!(written.orientation(), Some(6));
    assert_eq!(written.text(&MetadataField::Make), Some("Canon"));
    assert_eq!(written.text(&MetadataField::Copyright), Some("(c) Studio"));
}

#[test]
fn translucent_image_is_palettized_into_png() {
    let img = RgbaImage::from_fn(64, 64, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, 128, if x < 32 { 255 } else { 0 }]));
    let input = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

    let mut config = ShrinkConfig::default();
    config.palette.target_color_count = Some(16);
    config.palette.dithering = true;

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let outcome = pipeline.shrink(&input).unwrap();

    assert_eq!(outcome.output_format, FileFormat::Png);
    assert!(outcome.decision.palette_mode);
    assert!(outcome.stages.contains(&Stage::Quantized));

    let decoder = png::Decoder::new(Cursor::new(&outcome.bytes));
    let reader = decoder.read_info().unwrap();
    let info = reader.info();
    assert_eq!(info.color_type, png::ColorType::Indexed);
    let entries = info.palette.as_deref().map(|p| p.len() / 3).unwrap_or(0);
    assert!(entries >= 1 && entries <= 16, "{entries} palette entries");
}

#[test]
fn forced_webp_is_lossless() {
    let input = photo_png(32, 32);
    let mut config = ShrinkConfig::default();
    config.output.format = Some(Container::WebP);

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let outcome = pipeline.shrink(&input).unwrap();

    assert_eq!(outcome.output_format, FileFormat::WebP);
    assert_eq!(outcome.decision.quality, None);
    let original = image::load_from_memory(&input).unwrap().to_rgb8();
    let roundtrip = image::load_from_memory(&outcome.bytes).unwrap().to_rgb8();
    assert_eq!(original, roundtrip);
}

#[test]
fn batch_run_writes_outputs_and_report() {
    let tmp = TempDir::new().unwrap();
    let input_dir = tmp.path().join("photos");
    std::fs::create_dir_all(input_dir.join("trip")).unwrap();
    std::fs::write(input_dir.join("wide.png"), photo_png(300, 100)).unwrap();
    std::fs::write(input_dir.join("trip/tall.png"), photo_png(50, 200)).unwrap();
    std::fs::write(input_dir.join("readme.txt"), b"not an image").unwrap();

    let mut config = ShrinkConfig::default();
    config.resize.max_width = Some(100);
    config.resize.max_height = Some(100);

    let backend = RustBackend::new();
    let pipeline = ShrinkPipeline::new(config, &backend, &ExifCodec).unwrap();
    let sources = batch::discover(&[input_dir]).unwrap();
    assert_eq!(sources.len(), 2);

    let out = tmp.path().join("shrunk");
    let report = batch::run_batch(&pipeline, &sources, &Placement::Directory(out.clone()), None);
    assert!(!report.has_failures());

    let tall = image::open(out.join("trip/tall.jpeg")).unwrap();
    assert_eq!((tall.width(), tall.height()), (25, 100));
    let wide = image::open(out.join("wide.jpeg")).unwrap();
    assert_eq!((wide.width(), wide.height()), (100, 33));

    let report_path = tmp.path().join("report.json");
    report.write_json(&report_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(json["shrunk"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["failed"].as_array().map(Vec::len), Some(0));
}
