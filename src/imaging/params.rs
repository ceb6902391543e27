//! Parameter types for encoding decisions.
//!
//! These types describe *what* to produce, not *how*. The
//! [`FormatSelector`](crate::format) fills in a [`FormatDecision`]; the
//! [`backend`](super::backend) turns it into bytes. Keeping the decision a
//! plain value lets tests assert on it without encoding anything.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`FileFormat`]: Concrete container of a file on disk (input or output).
//! - [`Container`]: Output container choice, including "same as the input".
//! - [`FormatDecision`]: Container + quality + palette mode for one encode.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Concrete container format of an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl FileFormat {
    /// Canonical file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Jpeg => "jpeg",
            FileFormat::Png => "png",
            FileFormat::WebP => "webp",
            FileFormat::Gif => "gif",
            FileFormat::Bmp => "bmp",
            FileFormat::Tiff => "tiff",
        }
    }

    /// Formats whose output is actively re-optimized. Anything else is
    /// written back in its own container.
    pub fn is_web_format(self) -> bool {
        matches!(self, FileFormat::Jpeg | FileFormat::Png | FileFormat::WebP)
    }

    /// Containers the EXIF codec can write into.
    pub fn carries_exif(self) -> bool {
        self.is_web_format()
    }

    /// Whether the format can store an indexed palette.
    pub fn supports_palette(self) -> bool {
        self == FileFormat::Png
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FileFormat::Jpeg => "JPEG",
            FileFormat::Png => "PNG",
            FileFormat::WebP => "WEBP",
            FileFormat::Gif => "GIF",
            FileFormat::Bmp => "BMP",
            FileFormat::Tiff => "TIFF",
        })
    }
}

/// Output container chosen for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    WebP,
    /// Same container as the input.
    Unchanged,
}

impl Container {
    /// The concrete format written for an input of `source` format.
    pub fn resolve(self, source: FileFormat) -> FileFormat {
        match self {
            Container::Jpeg => FileFormat::Jpeg,
            Container::Png => FileFormat::Png,
            Container::WebP => FileFormat::WebP,
            Container::Unchanged => source,
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Container::Jpeg => "JPEG",
            Container::Png => "PNG",
            Container::WebP => "WEBP",
            Container::Unchanged => "unchanged",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl std::fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid format {:?} (expected jpeg, png, webp or unchanged)", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

/// Parses `"png"`, `".JPG"`, `"WebP"` and friends.
impl FromStr for Container {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match key.as_str() {
            "jpeg" | "jpg" => Ok(Container::Jpeg),
            "png" => Ok(Container::Png),
            "webp" => Ok(Container::WebP),
            "unchanged" => Ok(Container::Unchanged),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Resolved encoding parameters for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDecision {
    pub container: Container,
    /// Lossy quality; `None` means lossless.
    pub quality: Option<Quality>,
    /// Encode as an indexed palette (PNG only).
    pub palette_mode: bool,
}

impl FormatDecision {
    pub fn lossless(container: Container) -> Self {
        Self {
            container,
            quality: None,
            palette_mode: false,
        }
    }

    pub fn lossy(container: Container, quality: Quality) -> Self {
        Self {
            container,
            quality: Some(quality),
            palette_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn container_parses_aliases() {
        assert_eq!("jpg".parse::<Container>().unwrap(), Container::Jpeg);
        assert_eq!(".JPEG".parse::<Container>().unwrap(), Container::Jpeg);
        assert_eq!("PNG".parse::<Container>().unwrap(), Container::Png);
        assert_eq!("webp".parse::<Container>().unwrap(), Container::WebP);
        assert!("tiff".parse::<Container>().is_err());
    }

    #[test]
    fn unchanged_resolves_to_source() {
        assert_eq!(Container::Unchanged.resolve(FileFormat::Gif), FileFormat::Gif);
        assert_eq!(Container::Png.resolve(FileFormat::Gif), FileFormat::Png);
    }

    #[test]
    fn only_png_holds_a_palette() {
        assert!(FileFormat::Png.supports_palette());
        assert!(!FileFormat::Jpeg.supports_palette());
        assert!(!FileFormat::WebP.supports_palette());
        assert!(!FileFormat::Gif.supports_palette());
        assert!(Container::Unchanged.resolve(FileFormat::Png).supports_palette());
        assert!(!Container::Unchanged.resolve(FileFormat::Jpeg).supports_palette());
    }
}
