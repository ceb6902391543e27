//! Output container and codec settings.
//!
//! [`select`] walks a fixed decision order and stops at the first rule that
//! applies:
//!
//! 1. a container forced by configuration,
//! 2. `prefer_webp` → WebP,
//! 3. a source that is not a web format (GIF, BMP, TIFF) → unchanged,
//! 4. an indexed image or any non-opaque pixel → PNG,
//! 5. anything else is photographic → JPEG.
//!
//! Only JPEG is lossy. The quality it gets is the configured value when
//! there is one, the size-driven [`adaptive_quality`] when enabled, and
//! [`Quality::default`] otherwise.

use crate::imaging::{Container, FileFormat, FormatDecision, Quality, adaptive_quality};
use crate::types::{ColorMode, RawImage};

/// Caller preferences consulted by [`select`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionHints {
    pub forced: Option<Container>,
    pub prefer_webp: bool,
    pub quality: Option<Quality>,
    pub adaptive_quality: bool,
}

/// Pick the container, quality and palette mode for `image`.
pub fn select(image: &RawImage, source: FileFormat, hints: &SelectionHints) -> FormatDecision {
    let container = if let Some(forced) = hints.forced {
        forced
    } else if hints.prefer_webp {
        Container::WebP
    } else if !source.is_web_format() {
        Container::Unchanged
    } else if image.mode() == ColorMode::Indexed || image.has_alpha() {
        Container::Png
    } else {
        Container::Jpeg
    };
    configure(container, image, source, hints)
}

fn configure(container: Container, image: &RawImage, source: FileFormat, hints: &SelectionHints) -> FormatDecision {
    match container.resolve(source) {
        FileFormat::Jpeg => FormatDecision::lossy(container, lossy_quality(image, hints)),
        FileFormat::Png => FormatDecision {
            palette_mode: image.mode() == ColorMode::Indexed,
            ..FormatDecision::lossless(container)
        },
        _ => FormatDecision::lossless(container),
    }
}

fn lossy_quality(image: &RawImage, hints: &SelectionHints) -> Quality {
    match hints.quality {
        Some(explicit) => explicit,
        None if hints.adaptive_quality => {
            let (w, h) = image.dimensions();
            Quality::new(adaptive_quality(w, h))
        }
        None => Quality::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque(width: u32, height: u32) -> RawImage {
        RawImage::new(width, height, ColorMode::Rgb, vec![90; (width * height * 3) as usize]).unwrap()
    }

    fn translucent() -> RawImage {
        RawImage::new(2, 1, ColorMode::Rgba, vec![1, 2, 3, 255, 4, 5, 6, 10]).unwrap()
    }

    fn indexed() -> RawImage {
        RawImage::indexed(2, 1, vec![[0, 0, 0, 255], [255, 255, 255, 255]], vec![0, 1]).unwrap()
    }

    #[test]
    fn photo_becomes_jpeg_at_default_quality() {
        let decision = select(&opaque(10, 10), FileFormat::Png, &SelectionHints::default());
        assert_eq!(decision, FormatDecision::lossy(Container::Jpeg, Quality::new(80)));
    }

    #[test]
    fn alpha_becomes_png() {
        let decision = select(&translucent(), FileFormat::Jpeg, &SelectionHints::default());
        assert_eq!(decision, FormatDecision::lossless(Container::Png));
    }

    #[test]
    fn opaque_rgba_is_still_a_photo() {
        let img = RawImage::new(1, 1, ColorMode::Rgba, vec![1, 2, 3, 255]).unwrap();
        let decision = select(&img, FileFormat::Png, &SelectionHints::default());
        assert_eq!(decision.container, Container::Jpeg);
    }

    #[test]
    fn indexed_becomes_palette_png() {
        let decision = select(&indexed(), FileFormat::Jpeg, &SelectionHints::default());
        assert_eq!(decision.container, Container::Png);
        assert!(decision.palette_mode);
        assert_eq!(decision.quality, None);
    }

    #[test]
    fn non_web_source_is_unchanged() {
        for source in [FileFormat::Gif, FileFormat::Bmp, FileFormat::Tiff] {
            let decision = select(&opaque(4, 4), source, &SelectionHints::default());
            assert_eq!(decision, FormatDecision::lossless(Container::Unchanged), "{source}");
        }
    }

    #[test]
    fn unchanged_jpeg_source_keeps_quality() {
        let hints = SelectionHints {
            forced: Some(Container::Unchanged),
            ..SelectionHints::default()
        };
        let decision = select(&opaque(4, 4), FileFormat::Jpeg, &hints);
        assert_eq!(decision, FormatDecision::lossy(Container::Unchanged, Quality::default()));
    }

    #[test]
    fn forced_container_wins_over_everything() {
        let hints = SelectionHints {
            forced: Some(Container::Jpeg),
            prefer_webp: true,
            ..SelectionHints::default()
        };
        let decision = select(&translucent(), FileFormat::Gif, &hints);
        assert_eq!(decision.container, Container::Jpeg);
    }

    #[test]
    fn prefer_webp_beats_source_and_alpha() {
        let hints = SelectionHints {
            prefer_webp: true,
            ..SelectionHints::default()
        };
        for (image, source) in [(translucent(), FileFormat::Png), (opaque(2, 2), FileFormat::Bmp)] {
            assert_eq!(select(&image, source, &hints), FormatDecision::lossless(Container::WebP));
        }
    }

    #[test]
    fn explicit_quality_is_used_verbatim() {
        let hints = SelectionHints {
            quality: Some(Quality::new(35)),
            adaptive_quality: true,
            ..SelectionHints::default()
        };
        let decision = select(&opaque(8, 8), FileFormat::Jpeg, &hints);
        assert_eq!(decision.quality, Some(Quality::new(35)));
    }

    #[test]
    fn adaptive_quality_scales_with_size() {
        let hints = SelectionHints {
            adaptive_quality: true,
            ..SelectionHints::default()
        };
        let small = select(&opaque(16, 16), FileFormat::Jpeg, &hints);
        let large = select(&opaque(2048, 2048), FileFormat::Jpeg, &hints);
        assert_eq!(large.quality, Some(Quality::new(62)));
        assert!(small.quality > large.quality);
    }

    #[test]
    fn forced_png_of_truecolor_is_not_palette_mode() {
        let hints = SelectionHints {
            forced: Some(Container::Png),
            ..SelectionHints::default()
        };
        let decision = select(&opaque(4, 4), FileFormat::Jpeg, &hints);
        assert_eq!(decision, FormatDecision::lossless(Container::Png));
    }
}
