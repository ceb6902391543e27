//! Logical image metadata and the retention policy applied to it.
//!
//! Embedded metadata is modelled as a [`MetadataBag`]: a map from a logical
//! field name to a value, independent of how the bytes are laid out in the
//! file. The EXIF codec in [`crate::imaging::exif_codec`] fills the bag on
//! the way in and serializes it on the way out; everything in between only
//! deals with fields.
//!
//! ## Fields
//!
//! The fields callers care about get their own [`MetadataField`] variant
//! (artist, copyright, orientation, timestamps, camera make/model). Every
//! other tag is kept as [`MetadataField::Tag`] with an opaque
//! [`MetadataValue::Raw`] payload, so a round trip preserves tags this crate
//! has never heard of. GPS tags are always opaque and live under
//! [`Ifd::Gps`].
//!
//! A key is fully determined by where the tag is stored: inserting
//! `Tag { ifd: Primary, tag: 0x013B }` lands on [`MetadataField::Artist`].
//! A named tag whose stored value has an unexpected type keeps its name and
//! carries a `Raw` value, so an override still replaces it.
//!
//! ## Retention
//!
//! [`MetadataPolicy::resolve`] decides what survives:
//!
//! | `keep_metadata` | Result |
//! |---|---|
//! | `false` | only the override fields (typically artist / copyright) |
//! | `true` | the original bag, with every override replacing its field |
//!
//! Orientation is logical metadata here. The pipeline never rotates pixels,
//! so the tag passes through untouched; callers that do rotate pixels turn on
//! [`MetadataPolicy::normalize_orientation`] to reset it to "no rotation".

use std::collections::BTreeMap;

/// Orientation tag value meaning "pixels are stored upright".
pub const ORIENTATION_NORMAL: u16 = 1;

/// Which image file directory a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ifd {
    /// IFD0, the primary image directory.
    Primary,
    /// The Exif sub-IFD (capture settings, original timestamps).
    Exif,
    /// The GPS sub-IFD.
    Gps,
}

/// A logical metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataField {
    Orientation,
    Artist,
    Copyright,
    /// When the picture was taken (`DateTimeOriginal`).
    CaptureTimestamp,
    /// When the file was last changed (`DateTime`).
    ModifyTimestamp,
    Make,
    Model,
    Software,
    Description,
    /// Any other tag, carried as an opaque value.
    Tag { ifd: Ifd, tag: u16 },
}

impl MetadataField {
    /// The field stored at `tag` in `ifd`.
    pub fn from_tag(ifd: Ifd, tag: u16) -> Self {
        match (ifd, tag) {
            (Ifd::Primary, 0x010E) => MetadataField::Description,
            (Ifd::Primary, 0x010F) => MetadataField::Make,
            (Ifd::Primary, 0x0110) => MetadataField::Model,
            (Ifd::Primary, 0x0112) => MetadataField::Orientation,
            (Ifd::Primary, 0x0131) => MetadataField::Software,
            (Ifd::Primary, 0x0132) => MetadataField::ModifyTimestamp,
            (Ifd::Primary, 0x013B) => MetadataField::Artist,
            (Ifd::Primary, 0x8298) => MetadataField::Copyright,
            (Ifd::Exif, 0x9003) => MetadataField::CaptureTimestamp,
            _ => MetadataField::Tag { ifd, tag },
        }
    }

    /// Directory and tag number the field is stored under.
    pub fn location(self) -> (Ifd, u16) {
        match self {
            MetadataField::Description => (Ifd::Primary, 0x010E),
            MetadataField::Make => (Ifd::Primary, 0x010F),
            MetadataField::Model => (Ifd::Primary, 0x0110),
            MetadataField::Orientation => (Ifd::Primary, 0x0112),
            MetadataField::Software => (Ifd::Primary, 0x0131),
            MetadataField::ModifyTimestamp => (Ifd::Primary, 0x0132),
            MetadataField::Artist => (Ifd::Primary, 0x013B),
            MetadataField::Copyright => (Ifd::Primary, 0x8298),
            MetadataField::CaptureTimestamp => (Ifd::Exif, 0x9003),
            MetadataField::Tag { ifd, tag } => (ifd, tag),
        }
    }

    fn canonical(self) -> Self {
        let (ifd, tag) = self.location();
        Self::from_tag(ifd, tag)
    }
}

impl std::fmt::Display for MetadataField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataField::Orientation => f.write_str("orientation"),
            MetadataField::Artist => f.write_str("artist"),
            MetadataField::Copyright => f.write_str("copyright"),
            MetadataField::CaptureTimestamp => f.write_str("capture-timestamp"),
            MetadataField::ModifyTimestamp => f.write_str("modify-timestamp"),
            MetadataField::Make => f.write_str("make"),
            MetadataField::Model => f.write_str("model"),
            MetadataField::Software => f.write_str("software"),
            MetadataField::Description => f.write_str("description"),
            MetadataField::Tag { ifd, tag } => {
                let prefix = match ifd {
                    Ifd::Primary => "ifd0",
                    Ifd::Exif => "exif",
                    Ifd::Gps => "gps",
                };
                write!(f, "{prefix}:{tag:#06x}")
            }
        }
    }
}

/// An opaque tag payload: TIFF field type, value count and the value bytes
/// (little-endian).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    pub field_type: u16,
    pub count: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Short(u16),
    Raw(RawValue),
}

impl MetadataValue {
    pub fn text(value: impl Into<String>) -> Self {
        MetadataValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<u16> {
        match self {
            MetadataValue::Short(v) => Some(*v),
            _ => None,
        }
    }
}

/// Named metadata fields attached to an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBag {
    fields: BTreeMap<MetadataField, MetadataValue>,
}

impl MetadataBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the value it replaced.
    ///
    /// A raw tag number that names a known field is stored under that field.
    pub fn insert(&mut self, field: MetadataField, value: MetadataValue) -> Option<MetadataValue> {
        self.fields.insert(field.canonical(), value)
    }

    pub fn get(&self, field: &MetadataField) -> Option<&MetadataValue> {
        self.fields.get(&field.canonical())
    }

    pub fn remove(&mut self, field: &MetadataField) -> Option<MetadataValue> {
        self.fields.remove(&field.canonical())
    }

    pub fn contains(&self, field: &MetadataField) -> bool {
        self.fields.contains_key(&field.canonical())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetadataField, &MetadataValue)> {
        self.fields.iter()
    }

    pub fn text(&self, field: &MetadataField) -> Option<&str> {
        self.get(field).and_then(MetadataValue::as_text)
    }

    pub fn orientation(&self) -> Option<u16> {
        self.get(&MetadataField::Orientation)
            .and_then(MetadataValue::as_short)
    }
}

impl FromIterator<(MetadataField, MetadataValue)> for MetadataBag {
    fn from_iter<I: IntoIterator<Item = (MetadataField, MetadataValue)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (field, value) in iter {
            bag.insert(field, value);
        }
        bag
    }
}

impl IntoIterator for MetadataBag {
    type Item = (MetadataField, MetadataValue);
    type IntoIter = std::collections::btree_map::IntoIter<MetadataField, MetadataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Build the override bag from the optional artist / copyright strings.
///
/// Empty or whitespace-only strings are ignored rather than written as
/// blank tags.
pub fn overrides_from(artist: Option<&str>, copyright: Option<&str>) -> MetadataBag {
    [
        (MetadataField::Artist, artist),
        (MetadataField::Copyright, copyright),
    ]
    .into_iter()
    .filter_map(|(field, value)| {
        value
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| (field, MetadataValue::text(s)))
    })
    .collect()
}

/// What metadata survives into the output image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPolicy {
    keep_metadata: bool,
    overrides: MetadataBag,
    normalize_orientation: bool,
}

impl MetadataPolicy {
    pub fn new(keep_metadata: bool, overrides: MetadataBag) -> Self {
        Self {
            keep_metadata,
            overrides,
            normalize_orientation: false,
        }
    }

    /// Reset orientation to [`ORIENTATION_NORMAL`] in the result.
    ///
    /// Only for callers that have physically rotated the pixel data.
    pub fn normalize_orientation(mut self, normalize: bool) -> Self {
        self.normalize_orientation = normalize;
        self
    }

    pub fn keeps_metadata(&self) -> bool {
        self.keep_metadata
    }

    /// Produce the bag that will be written to the output.
    pub fn resolve(&self, original: &MetadataBag) -> MetadataBag {
        let mut result = if self.keep_metadata {
            original.clone()
        } else {
            MetadataBag::new()
        };

        for (field, value) in self.overrides.iter() {
            result.insert(*field, value.clone());
        }

        if self.normalize_orientation && result.contains(&MetadataField::Orientation) {
            result.insert(
                MetadataField::Orientation,
                MetadataValue::Short(ORIENTATION_NORMAL),
            );
        }

        result
    }
}

/// Resolve metadata with the default policy (orientation passed through).
pub fn resolve(original: &MetadataBag, keep_metadata: bool, overrides: &MetadataBag) -> MetadataBag {
    MetadataPolicy::new(keep_metadata, overrides.clone()).resolve(original)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_bag() -> MetadataBag {
        [
            (MetadataField::Orientation, MetadataValue::Short(6)),
            (MetadataField::Artist, MetadataValue::text("Original Artist")),
            (MetadataField::Make, MetadataValue::text("Canon")),
            (
                MetadataField::CaptureTimestamp,
                MetadataValue::text("2024:05:01 10:00:00"),
            ),
            (
                MetadataField::Tag {
                    ifd: Ifd::Gps,
                    tag: 0x0002,
                },
                MetadataValue::Raw(RawValue {
                    field_type: 5,
                    count: 3,
                    bytes: vec![1; 24],
                }),
            ),
        ]
        .into_iter()
        .collect()
    }

    // =========================================================================
    // resolve() tests
    // =========================================================================

    #[test]
    fn drop_metadata_keeps_only_overrides() {
        let overrides: MetadataBag = [(MetadataField::Artist, MetadataValue::text("A"))]
            .into_iter()
            .collect();
        let result = resolve(&camera_bag(), false, &overrides);
        assert_eq!(result, overrides);
    }

    #[test]
    fn drop_metadata_without_overrides_is_empty() {
        let result = resolve(&camera_bag(), false, &MetadataBag::new());
        assert!(result.is_empty());
    }

    #[test]
    fn keep_metadata_without_overrides_is_identity() {
        let original = camera_bag();
        assert_eq!(resolve(&original, true, &MetadataBag::new()), original);
    }

    #[test]
    fn keep_metadata_override_wins() {
        let overrides = overrides_from(Some("New Artist"), Some("(c) 2025"));
        let result = resolve(&camera_bag(), true, &overrides);

        assert_eq!(result.text(&MetadataField::Artist), Some("New Artist"));
        assert_eq!(result.text(&MetadataField::Copyright), Some("(c) 2025"));
        // Untouched fields pass through, opaque GPS included
        assert_eq!(result.text(&MetadataField::Make), Some("Canon"));
        assert!(result.contains(&MetadataField::Tag {
            ifd: Ifd::Gps,
            tag: 0x0002
        }));
    }

    #[test]
    fn override_replaces_named_tag_stored_by_number() {
        let original: MetadataBag = [(
            MetadataField::Tag {
                ifd: Ifd::Primary,
                tag: 0x8298,
            },
            MetadataValue::Raw(RawValue {
                field_type: 7,
                count: 3,
                bytes: b"Old".to_vec(),
            }),
        )]
        .into_iter()
        .collect();

        let result = resolve(&original, true, &overrides_from(None, Some("New")));
        assert_eq!(result.len(), 1);
        assert_eq!(result.text(&MetadataField::Copyright), Some("New"));
    }

    #[test]
    fn resolve_on_empty_original() {
        let overrides = overrides_from(Some("A"), None);
        assert_eq!(resolve(&MetadataBag::new(), true, &overrides), overrides);
    }

    // =========================================================================
    // Orientation
    // =========================================================================

    // Pixels are never rotated by the pipeline: orientation is logical-only
    // and must survive verbatim.
    #[test]
    fn orientation_passes_through_by_default() {
        let result = resolve(&camera_bag(), true, &MetadataBag::new());
        assert_eq!(result.orientation(), Some(6));
    }

    #[test]
    fn orientation_normalized_when_pixels_were_rotated() {
        let policy = MetadataPolicy::new(true, MetadataBag::new()).normalize_orientation(true);
        assert_eq!(policy.resolve(&camera_bag()).orientation(), Some(1));
    }

    #[test]
    fn normalization_does_not_invent_orientation() {
        let policy = MetadataPolicy::new(false, MetadataBag::new()).normalize_orientation(true);
        assert!(policy.resolve(&camera_bag()).is_empty());
    }

    // =========================================================================
    // overrides_from() tests
    // =========================================================================

    #[test]
    fn overrides_skip_blank_values() {
        let bag = overrides_from(Some("  "), Some("Studio"));
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.text(&MetadataField::Copyright), Some("Studio"));
    }

    #[test]
    fn overrides_trim_values() {
        let bag = overrides_from(Some("  Jane  "), None);
        assert_eq!(bag.text(&MetadataField::Artist), Some("Jane"));
    }

    // =========================================================================
    // Field keys
    // =========================================================================

    #[test]
    fn tag_number_of_named_field_shares_its_key() {
        let mut bag = MetadataBag::new();
        bag.insert(
            MetadataField::Tag {
                ifd: Ifd::Primary,
                tag: 0x013B,
            },
            MetadataValue::Raw(RawValue {
                field_type: 7,
                count: 1,
                bytes: vec![b'x'],
            }),
        );
        assert!(bag.contains(&MetadataField::Artist));

        let replaced = bag.insert(MetadataField::Artist, MetadataValue::text("Jane"));
        assert!(matches!(replaced, Some(MetadataValue::Raw(_))));
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.iter().next().map(|(f, _)| *f), Some(MetadataField::Artist));
    }

    #[test]
    fn location_and_from_tag_agree() {
        for field in [
            MetadataField::Orientation,
            MetadataField::Artist,
            MetadataField::Copyright,
            MetadataField::CaptureTimestamp,
            MetadataField::ModifyTimestamp,
            MetadataField::Make,
            MetadataField::Model,
            MetadataField::Software,
            MetadataField::Description,
        ] {
            let (ifd, tag) = field.location();
            assert_eq!(MetadataField::from_tag(ifd, tag), field);
        }
        // Same number, different directory: not a named field
        assert_eq!(
            MetadataField::from_tag(Ifd::Gps, 0x013B),
            MetadataField::Tag {
                ifd: Ifd::Gps,
                tag: 0x013B
            }
        );
    }

    #[test]
    fn field_display_names() {
        assert_eq!(MetadataField::CaptureTimestamp.to_string(), "capture-timestamp");
        assert_eq!(
            MetadataField::Tag {
                ifd: Ifd::Gps,
                tag: 2
            }
            .to_string(),
            "gps:0x0002"
        );
    }
}
