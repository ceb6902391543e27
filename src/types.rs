//! The decoded image model shared by every pipeline stage.
//!
//! A [`RawImage`] is owned by exactly one stage at a time. Stages take it by
//! value and hand a new (or mutated) image onward, so there is never a second
//! reference to a buffer that is being rewritten.

use crate::metadata::MetadataBag;
use std::collections::HashSet;
use thiserror::Error;

/// One color sample expanded to RGBA.
pub type Rgba = [u8; 4];

/// Largest palette an indexed image may carry.
pub const MAX_PALETTE_LEN: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageLayoutError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
    #[error("palette has {0} entries, expected 1-256")]
    PaletteSize(usize),
    #[error("pixel index {index} out of range for a {len}-entry palette")]
    IndexOutOfRange { index: u8, len: usize },
    #[error("indexed images must be built with RawImage::indexed")]
    MissingPalette,
}

/// Pixel layout of a [`RawImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Grayscale,
    Rgb,
    Rgba,
    /// One byte per pixel, indexing into [`RawImage::palette`].
    Indexed,
}

impl ColorMode {
    /// Bytes per pixel in the pixel buffer.
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Grayscale | ColorMode::Indexed => 1,
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
        }
    }

    /// Whether palette reduction can apply to this layout.
    ///
    /// Grayscale and already-indexed images are left alone.
    pub fn is_truecolor(self) -> bool {
        matches!(self, ColorMode::Rgb | ColorMode::Rgba)
    }
}

impl std::fmt::Display for ColorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColorMode::Grayscale => "grayscale",
            ColorMode::Rgb => "rgb",
            ColorMode::Rgba => "rgba",
            ColorMode::Indexed => "indexed",
        };
        f.write_str(name)
    }
}

/// Decoded pixel buffer plus the metadata that travelled with it.
///
/// Invariant: `pixels.len() == width * height * mode.channels()`, and for
/// indexed images every pixel is a valid index into a 1–256 entry palette.
/// Both are checked by the constructors, which is why the fields are private.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    width: u32,
    height: u32,
    mode: ColorMode,
    pixels: Vec<u8>,
    palette: Vec<Rgba>,
    metadata: MetadataBag,
}

impl RawImage {
    /// Build a truecolor or grayscale image.
    pub fn new(
        width: u32,
        height: u32,
        mode: ColorMode,
        pixels: Vec<u8>,
    ) -> Result<Self, ImageLayoutError> {
        if mode == ColorMode::Indexed {
            return Err(ImageLayoutError::MissingPalette);
        }
        check_buffer(width, height, mode, pixels.len())?;
        Ok(Self {
            width,
            height,
            mode,
            pixels,
            palette: Vec::new(),
            metadata: MetadataBag::new(),
        })
    }

    /// Build an indexed image from a palette and one index byte per pixel.
    pub fn indexed(
        width: u32,
        height: u32,
        palette: Vec<Rgba>,
        indices: Vec<u8>,
    ) -> Result<Self, ImageLayoutError> {
        if palette.is_empty() || palette.len() > MAX_PALETTE_LEN {
            return Err(ImageLayoutError::PaletteSize(palette.len()));
        }
        check_buffer(width, height, ColorMode::Indexed, indices.len())?;
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= palette.len()) {
            return Err(ImageLayoutError::IndexOutOfRange {
                index,
                len: palette.len(),
            });
        }
        Ok(Self {
            width,
            height,
            mode: ColorMode::Indexed,
            pixels: indices,
            palette,
            metadata: MetadataBag::new(),
        })
    }

    /// Attach a metadata bag, replacing whatever was there.
    pub fn with_metadata(mut self, metadata: MetadataBag) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Palette entries; empty unless the image is indexed.
    pub fn palette(&self) -> &[Rgba] {
        &self.palette
    }

    pub fn metadata(&self) -> &MetadataBag {
        &self.metadata
    }

    /// Move the metadata out, leaving an empty bag behind.
    pub fn take_metadata(&mut self) -> MetadataBag {
        std::mem::take(&mut self.metadata)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// The color of pixel `index` (row-major), expanded to RGBA.
    pub fn color_at(&self, index: usize) -> Rgba {
        match self.mode {
            ColorMode::Grayscale => {
                let v = self.pixels[index];
                [v, v, v, 255]
            }
            ColorMode::Rgb => {
                let p = &self.pixels[index * 3..index * 3 + 3];
                [p[0], p[1], p[2], 255]
            }
            ColorMode::Rgba => {
                let p = &self.pixels[index * 4..index * 4 + 4];
                [p[0], p[1], p[2], p[3]]
            }
            ColorMode::Indexed => self.palette[self.pixels[index] as usize],
        }
    }

    /// Every pixel expanded to RGBA, row-major.
    pub fn colors(&self) -> impl Iterator<Item = Rgba> + '_ {
        (0..self.pixel_count()).map(|i| self.color_at(i))
    }

    /// Interleaved RGBA8 copy of the pixel data.
    pub fn to_rgba8(&self) -> Vec<u8> {
        if self.mode == ColorMode::Rgba {
            return self.pixels.clone();
        }
        let mut out = Vec::with_capacity(self.pixel_count() * 4);
        for color in self.colors() {
            out.extend_from_slice(&color);
        }
        out
    }

    /// True when at least one pixel is not fully opaque.
    pub fn has_alpha(&self) -> bool {
        match self.mode {
            ColorMode::Grayscale | ColorMode::Rgb => false,
            ColorMode::Rgba => self.pixels.chunks_exact(4).any(|p| p[3] < 255),
            ColorMode::Indexed => {
                let translucent: Vec<bool> = self.palette.iter().map(|c| c[3] < 255).collect();
                self.pixels.iter().any(|&i| translucent[i as usize])
            }
        }
    }

    /// Composite every pixel over an opaque `background`.
    ///
    /// RGBA becomes RGB; an indexed image keeps its indices and gets an
    /// opaque palette. Images without alpha come back untouched.
    pub fn flatten(self, background: [u8; 3]) -> RawImage {
        let blend = |c: Rgba| -> Rgba {
            let a = c[3] as u32;
            let mix = |fg: u8, bg: u8| ((fg as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8;
            [
                mix(c[0], background[0]),
                mix(c[1], background[1]),
                mix(c[2], background[2]),
                255,
            ]
        };
        match self.mode {
            ColorMode::Rgba => {
                let pixels = self
                    .pixels
                    .chunks_exact(4)
                    .flat_map(|p| {
                        let [r, g, b, _] = blend([p[0], p[1], p[2], p[3]]);
                        [r, g, b]
                    })
                    .collect();
                RawImage {
                    mode: ColorMode::Rgb,
                    pixels,
                    ..self
                }
            }
            ColorMode::Indexed => RawImage {
                palette: self.palette.iter().map(|&c| blend(c)).collect(),
                ..self
            },
            ColorMode::Grayscale | ColorMode::Rgb => self,
        }
    }

    /// Number of distinct RGBA colors in the image.
    pub fn distinct_colors(&self) -> usize {
        match self.mode {
            ColorMode::Indexed => {
                // Two palette slots may hold the same color.
                let mut used = [false; MAX_PALETTE_LEN];
                for &i in &self.pixels {
                    used[i as usize] = true;
                }
                self.palette
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| used[*i])
                    .map(|(_, c)| *c)
                    .collect::<HashSet<Rgba>>()
                    .len()
            }
            _ => self.colors().collect::<HashSet<Rgba>>().len(),
        }
    }
}

fn check_buffer(
    width: u32,
    height: u32,
    mode: ColorMode,
    actual: usize,
) -> Result<(), ImageLayoutError> {
    if width == 0 || height == 0 {
        return Err(ImageLayoutError::ZeroDimension { width, height });
    }
    let expected = width as usize * height as usize * mode.channels();
    if actual != expected {
        return Err(ImageLayoutError::BufferLength { expected, actual });
    }
    Ok(())
}
