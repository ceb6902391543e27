//! EXIF codec for JPEG, PNG, WebP and TIFF files.
//!
//! The TIFF-structured payload is parsed and rebuilt with `kamadak-exif`;
//! this module maps its fields onto a [`MetadataBag`] and splices the
//! rebuilt payload into the encoded image:
//!
//! | Container | Where the payload lives |
//! |---|---|
//! | JPEG | APP1 segment, `Exif\0\0` + TIFF |
//! | PNG | `eXIf` chunk before the first `IDAT` |
//! | WebP | `EXIF` RIFF chunk, flagged in `VP8X` |
//! | TIFF | the file's own IFD0 (read only) |
//!
//! Only IFD0 and its Exif and GPS sub-IFDs are kept. The thumbnail IFD, the
//! interoperability IFD and tags that describe the pixel layout of the
//! *source* file (strip offsets, pixel dimensions, compression) are dropped
//! because they would be wrong for the re-encoded image.

use crate::imaging::params::FileFormat;
use crate::metadata::{Ifd, MetadataBag, MetadataField, MetadataValue, RawValue};
use exif::experimental::Writer;
use exif::{Context, Field, In, Rational, SRational, Tag, Value};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("EXIF payload does not start with a TIFF header")]
    BadHeader,
    #[error("invalid EXIF payload: {0}")]
    Exif(#[from] exif::Error),
    #[error("malformed {format} stream: {reason}")]
    MalformedContainer { format: FileFormat, reason: String },
    #[error("cannot embed metadata in {0} output")]
    UnsupportedContainer(String),
    #[error("value of {0} does not match its declared type and count")]
    InconsistentValue(MetadataField),
    #[error("EXIF payload of {0} bytes exceeds the container limit")]
    PayloadTooLarge(usize),
}

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

// ---------------------------------------------------------------------------
// Container sniffing
// ---------------------------------------------------------------------------

/// Identify a container from its leading magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<FileFormat> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(FileFormat::Jpeg)
    } else if data.starts_with(PNG_SIGNATURE) {
        Some(FileFormat::Png)
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(FileFormat::WebP)
    } else if is_tiff_header(data) {
        Some(FileFormat::Tiff)
    } else if data.starts_with(b"GIF8") {
        Some(FileFormat::Gif)
    } else if data.starts_with(b"BM") {
        Some(FileFormat::Bmp)
    } else {
        None
    }
}

fn is_tiff_header(data: &[u8]) -> bool {
    data.starts_with(b"II*\0") || data.starts_with(b"MM\0*")
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read the metadata embedded in an encoded image.
///
/// Files without an EXIF payload (or in a container that never carries one)
/// yield an empty bag. A payload that is present but malformed is an error;
/// the caller decides whether that is fatal.
pub fn read_exif(data: &[u8]) -> Result<MetadataBag, MetadataError> {
    let payload = match sniff_format(data) {
        Some(FileFormat::Jpeg) => find_jpeg_exif(data)?,
        Some(FileFormat::Png) => find_png_exif(data)?,
        Some(FileFormat::WebP) => find_webp_exif(data)?,
        Some(FileFormat::Tiff) => Some(data),
        _ => None,
    };
    match payload {
        Some(tiff) => parse_tiff(tiff),
        None => Ok(MetadataBag::new()),
    }
}

/// Parse a TIFF-structured EXIF payload.
pub fn parse_tiff(data: &[u8]) -> Result<MetadataBag, MetadataError> {
    if !is_tiff_header(data) {
        return Err(MetadataError::BadHeader);
    }
    let exif = exif::Reader::new().read_raw(data.to_vec())?;
    Ok(exif.fields().filter_map(decode_field).collect())
}

/// Map one parsed field onto the bag, or `None` if it is not carried over.
fn decode_field(field: &Field) -> Option<(MetadataField, MetadataValue)> {
    if field.ifd_num != In::PRIMARY {
        return None;
    }
    let ifd = match field.tag.context() {
        Context::Tiff => Ifd::Primary,
        Context::Exif => Ifd::Exif,
        Context::Gps => Ifd::Gps,
        _ => return None,
    };
    let tag = field.tag.number();
    if is_layout_tag(ifd, tag) {
        return None;
    }

    // The key depends on the tag alone; a named tag stored with an
    // unexpected type keeps its name and carries the value opaquely.
    let key = MetadataField::from_tag(ifd, tag);
    let value = match (key, &field.value) {
        (MetadataField::Orientation, Value::Short(v)) if v.len() == 1 => MetadataValue::Short(v[0]),
        (MetadataField::Tag { .. } | MetadataField::Orientation, value) => MetadataValue::Raw(raw_from_value(value)?),
        (_, Value::Ascii(strings)) if strings.len() == 1 => match std::str::from_utf8(&strings[0]) {
            Ok(text) => MetadataValue::text(text.trim_end_matches('\0')),
            Err(_) => MetadataValue::Raw(raw_from_value(&field.value)?),
        },
        (_, value) => MetadataValue::Raw(raw_from_value(value)?),
    };
    Some((key, value))
}

/// Tags describing the source file's pixel layout or IFD structure; stale
/// after re-encoding.
fn is_layout_tag(ifd: Ifd, tag: u16) -> bool {
    match ifd {
        Ifd::Primary => matches!(
            tag,
            0x0100..=0x0103 // ImageWidth, ImageLength, BitsPerSample, Compression
                | 0x0106    // PhotometricInterpretation
                | 0x010A    // FillOrder
                | 0x0111    // StripOffsets
                | 0x0115..=0x0117 // SamplesPerPixel, RowsPerStrip, StripByteCounts
                | 0x011C    // PlanarConfiguration
                | 0x013D    // Predictor
                | 0x0140    // ColorMap
                | 0x0142..=0x0145 // Tile geometry
                | 0x0152..=0x0153 // ExtraSamples, SampleFormat
                | 0x0201..=0x0202 // JPEG thumbnail offset/length
                | 0x8773    // ICC profile
                | 0x8769    // Exif IFD pointer
                | 0x8825    // GPS IFD pointer
        ),
        Ifd::Exif => matches!(tag, 0xA002 | 0xA003 | 0xA005), // pixel dims, interop pointer
        Ifd::Gps => false,
    }
}

/// Byte size of one component of a TIFF field type.
fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 => Some(4),    // LONG, SLONG, FLOAT
        5 | 10 | 12 => Some(8),   // RATIONAL, SRATIONAL, DOUBLE
        _ => None,
    }
}

/// Flatten a parsed value into its TIFF type code, count and little-endian
/// bytes. Values of unknown type cannot be sized and are skipped.
fn raw_from_value(value: &Value) -> Option<RawValue> {
    let (field_type, count, bytes): (u16, usize, Vec<u8>) = match value {
        Value::Byte(v) => (1, v.len(), v.clone()),
        Value::Ascii(strings) => {
            let bytes: Vec<u8> = strings
                .iter()
                .flat_map(|s| s.iter().copied().chain(Some(0)))
                .collect();
            (2, bytes.len(), bytes)
        }
        Value::Short(v) => (3, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::Long(v) => (4, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::Rational(v) => (
            5,
            v.len(),
            v.iter()
                .flat_map(|r| r.num.to_le_bytes().into_iter().chain(r.denom.to_le_bytes()))
                .collect(),
        ),
        Value::SByte(v) => (6, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::Undefined(v, _) => (7, v.len(), v.clone()),
        Value::SShort(v) => (8, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::SLong(v) => (9, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::SRational(v) => (
            10,
            v.len(),
            v.iter()
                .flat_map(|r| r.num.to_le_bytes().into_iter().chain(r.denom.to_le_bytes()))
                .collect(),
        ),
        Value::Float(v) => (11, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        Value::Double(v) => (12, v.len(), v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        _ => return None,
    };
    Some(RawValue {
        field_type,
        count: u32::try_from(count).ok()?,
        bytes,
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Fixed-size little-endian words of a raw value.
fn words<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    bytes.chunks_exact(N).filter_map(|c| c.try_into().ok())
}

/// Rebuild a typed value from its raw form, checking type and count.
fn value_from_raw(field: MetadataField, raw: &RawValue) -> Result<Value, MetadataError> {
    let inconsistent = || MetadataError::InconsistentValue(field);
    let unit = type_size(raw.field_type).ok_or_else(inconsistent)?;
    if raw.bytes.len() != unit * raw.count as usize {
        return Err(inconsistent());
    }

    let b: &[u8] = &raw.bytes;
    let value = match raw.field_type {
        1 => Value::Byte(b.to_vec()),
        2 => {
            let body = b.strip_suffix(&[0]).unwrap_or(b);
            Value::Ascii(body.split(|&c| c == 0).map(<[u8]>::to_vec).collect())
        }
        3 => Value::Short(words(b).map(u16::from_le_bytes).collect()),
        4 => Value::Long(words(b).map(u32::from_le_bytes).collect()),
        5 => Value::Rational(
            words::<4>(b)
                .map(u32::from_le_bytes)
                .collect::<Vec<_>>()
                .chunks_exact(2)
                .map(|p| Rational { num: p[0], denom: p[1] })
                .collect(),
        ),
        6 => Value::SByte(words(b).map(i8::from_le_bytes).collect()),
        7 => Value::Undefined(b.to_vec(), 0),
        8 => Value::SShort(words(b).map(i16::from_le_bytes).collect()),
        9 => Value::SLong(words(b).map(i32::from_le_bytes).collect()),
        10 => Value::SRational(
            words::<4>(b)
                .map(i32::from_le_bytes)
                .collect::<Vec<_>>()
                .chunks_exact(2)
                .map(|p| SRational { num: p[0], denom: p[1] })
                .collect(),
        ),
        11 => Value::Float(words(b).map(f32::from_le_bytes).collect()),
        12 => Value::Double(words(b).map(f64::from_le_bytes).collect()),
        _ => return Err(inconsistent()),
    };
    Ok(value)
}

fn encode_field(field: MetadataField, value: &MetadataValue) -> Result<Field, MetadataError> {
    let (ifd, number) = field.location();
    let context = match ifd {
        Ifd::Primary => Context::Tiff,
        Ifd::Exif => Context::Exif,
        Ifd::Gps => Context::Gps,
    };
    let value = match value {
        MetadataValue::Text(s) => Value::Ascii(vec![s.as_bytes().to_vec()]),
        MetadataValue::Short(v) => Value::Short(vec![*v]),
        MetadataValue::Raw(raw) => value_from_raw(field, raw)?,
    };
    Ok(Field {
        tag: Tag(context, number),
        ifd_num: In::PRIMARY,
        value,
    })
}

/// Serialize a bag as a little-endian TIFF payload (no `Exif\0\0` prefix).
///
/// Layout tags are never written; sub-IFD pointers are generated by the
/// writer.
pub fn serialize_tiff(bag: &MetadataBag) -> Result<Vec<u8>, MetadataError> {
    let mut entries: Vec<(MetadataField, &MetadataValue)> = bag
        .iter()
        .filter(|(field, _)| {
            let (ifd, tag) = field.location();
            !is_layout_tag(ifd, tag)
        })
        .map(|(field, value)| (*field, value))
        .collect();
    entries.sort_by_key(|(field, _)| field.location());

    let fields = entries
        .into_iter()
        .map(|(field, value)| encode_field(field, value))
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut out = Cursor::new(Vec::with_capacity(256));
    writer.write(&mut out, true)?;
    Ok(out.into_inner())
}

/// Embed `bag` into an encoded image, replacing any EXIF already there.
pub fn write_exif(encoded: Vec<u8>, bag: &MetadataBag) -> Result<Vec<u8>, MetadataError> {
    let format = sniff_format(&encoded);
    if !matches!(format, Some(FileFormat::Jpeg | FileFormat::Png | FileFormat::WebP)) {
        let name = format.map_or_else(|| "unknown".to_string(), |f| f.to_string());
        return Err(MetadataError::UnsupportedContainer(name));
    }

    let tiff = serialize_tiff(bag)?;
    match format {
        Some(FileFormat::Jpeg) => splice_jpeg(&encoded, &tiff),
        Some(FileFormat::Png) => splice_png(&encoded, &tiff),
        _ => splice_webp(&encoded, &tiff),
    }
}

// ---------------------------------------------------------------------------
// JPEG: APP1 segment
// ---------------------------------------------------------------------------

/// A marker segment before the scan data: `[start, end)` includes the marker.
struct Segment {
    marker: u8,
    start: usize,
    end: usize,
}

fn malformed(format: FileFormat, reason: &str) -> MetadataError {
    MetadataError::MalformedContainer {
        format,
        reason: reason.to_string(),
    }
}

/// Walk the header segments of a JPEG up to (not including) SOS.
///
/// Returns the segments and the offset where the scan begins.
fn jpeg_segments(data: &[u8]) -> Result<(Vec<Segment>, usize), MetadataError> {
    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if pos + 4 > data.len() {
            return Err(malformed(FileFormat::Jpeg, "ended before start of scan"));
        }
        if data[pos] != 0xFF {
            return Err(malformed(FileFormat::Jpeg, "expected a marker"));
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // SOS (0xDA): entropy-coded data follows
        if marker == 0xDA {
            return Ok((segments, pos));
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > data.len() {
            return Err(malformed(FileFormat::Jpeg, "segment length out of bounds"));
        }
        segments.push(Segment {
            marker,
            start: pos,
            end: pos + 2 + len,
        });
        pos += 2 + len;
    }
}

fn is_exif_app1(data: &[u8], segment: &Segment) -> bool {
    segment.marker == 0xE1 && data[segment.start + 4..segment.end].starts_with(EXIF_HEADER)
}

fn find_jpeg_exif(data: &[u8]) -> Result<Option<&[u8]>, MetadataError> {
    let (segments, _) = jpeg_segments(data)?;
    Ok(segments
        .iter()
        .find(|s| is_exif_app1(data, s))
        .map(|s| &data[s.start + 4 + EXIF_HEADER.len()..s.end]))
}

fn splice_jpeg(data: &[u8], tiff: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let (segments, scan_start) = jpeg_segments(data)?;

    let payload_len = EXIF_HEADER.len() + tiff.len();
    let seg_len = u16::try_from(payload_len + 2).map_err(|_| MetadataError::PayloadTooLarge(payload_len))?;
    let mut app1 = Vec::with_capacity(payload_len + 4);
    app1.extend_from_slice(&[0xFF, 0xE1]);
    app1.extend_from_slice(&seg_len.to_be_bytes());
    app1.extend_from_slice(EXIF_HEADER);
    app1.extend_from_slice(tiff);

    let mut out = Vec::with_capacity(data.len() + app1.len());
    out.extend_from_slice(&data[..2]);

    // Keep a leading JFIF APP0 first, as readers expect
    let mut kept = segments.iter().filter(|s| !is_exif_app1(data, s)).peekable();
    if let Some(first) = kept.next_if(|s| s.marker == 0xE0) {
        out.extend_from_slice(&data[first.start..first.end]);
    }
    out.extend_from_slice(&app1);
    for segment in kept {
        out.extend_from_slice(&data[segment.start..segment.end]);
    }
    out.extend_from_slice(&data[scan_start..]);
    Ok(out)
}

// ---------------------------------------------------------------------------
// PNG: eXIf chunk
// ---------------------------------------------------------------------------

struct Chunk {
    kind: [u8; 4],
    start: usize,
    end: usize,
    data_start: usize,
}

fn png_chunks(data: &[u8]) -> Result<Vec<Chunk>, MetadataError> {
    let mut chunks = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos < data.len() {
        if pos + 8 > data.len() {
            return Err(malformed(FileFormat::Png, "truncated chunk header"));
        }
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let end = pos + 12 + len;
        if end > data.len() {
            return Err(malformed(FileFormat::Png, "chunk length out of bounds"));
        }
        chunks.push(Chunk {
            kind,
            start: pos,
            end,
            data_start: pos + 8,
        });
        pos = end;
    }
    Ok(chunks)
}

fn find_png_exif(data: &[u8]) -> Result<Option<&[u8]>, MetadataError> {
    let chunks = png_chunks(data)?;
    Ok(chunks
        .iter()
        .find(|c| &c.kind == b"eXIf")
        .map(|c| &data[c.data_start..c.end - 4]))
}

fn png_chunk(kind: &[u8; 4], body: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let len = u32::try_from(body.len()).map_err(|_| MetadataError::PayloadTooLarge(body.len()))?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(body);

    let mut out = Vec::with_capacity(12 + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    Ok(out)
}

fn splice_png(data: &[u8], tiff: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let chunks = png_chunks(data)?;
    if !chunks.iter().any(|c| &c.kind == b"IDAT") {
        return Err(malformed(FileFormat::Png, "no IDAT chunk"));
    }
    let exif = png_chunk(b"eXIf", tiff)?;

    let mut out = Vec::with_capacity(data.len() + exif.len());
    out.extend_from_slice(PNG_SIGNATURE);
    let mut inserted = false;
    for chunk in chunks.iter().filter(|c| &c.kind != b"eXIf") {
        if !inserted && &chunk.kind == b"IDAT" {
            out.extend_from_slice(&exif);
            inserted = true;
        }
        out.extend_from_slice(&data[chunk.start..chunk.end]);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// WebP: RIFF EXIF chunk
// ---------------------------------------------------------------------------

const VP8X_FLAG_EXIF: u8 = 0x08;
const VP8X_FLAG_ALPHA: u8 = 0x10;

fn riff_chunks(data: &[u8]) -> Result<Vec<Chunk>, MetadataError> {
    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let kind = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;
        let data_end = pos + 8 + len;
        if data_end > data.len() {
            return Err(malformed(FileFormat::WebP, "chunk length out of bounds"));
        }
        // Chunks are padded to an even size; the final pad byte may be missing
        let end = (data_end + len % 2).min(data.len());
        chunks.push(Chunk {
            kind,
            start: pos,
            end,
            data_start: pos + 8,
        });
        pos = end;
    }
    Ok(chunks)
}

fn find_webp_exif(data: &[u8]) -> Result<Option<&[u8]>, MetadataError> {
    let chunks = riff_chunks(data)?;
    let Some(chunk) = chunks.iter().find(|c| &c.kind == b"EXIF") else {
        return Ok(None);
    };
    let len = u32::from_le_bytes([
        data[chunk.start + 4],
        data[chunk.start + 5],
        data[chunk.start + 6],
        data[chunk.start + 7],
    ]) as usize;
    let body = &data[chunk.data_start..chunk.data_start + len];
    // Some writers keep the JPEG-style prefix
    Ok(Some(body.strip_prefix(EXIF_HEADER).unwrap_or(body)))
}

/// Canvas size and alpha flag of a simple-format (`VP8 ` / `VP8L`) WebP.
fn simple_webp_canvas(kind: &[u8; 4], body: &[u8]) -> Result<(u32, u32, bool), MetadataError> {
    match kind {
        b"VP8L" => {
            if body.len() < 5 || body[0] != 0x2F {
                return Err(malformed(FileFormat::WebP, "bad VP8L header"));
            }
            let bits = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
            let width = (bits & 0x3FFF) + 1;
            let height = ((bits >> 14) & 0x3FFF) + 1;
            let alpha = (bits >> 28) & 1 == 1;
            Ok((width, height, alpha))
        }
        b"VP8 " => {
            if body.len() < 10 || body[3..6] != [0x9D, 0x01, 0x2A] {
                return Err(malformed(FileFormat::WebP, "bad VP8 frame header"));
            }
            let width = u16::from_le_bytes([body[6], body[7]]) as u32 & 0x3FFF;
            let height = u16::from_le_bytes([body[8], body[9]]) as u32 & 0x3FFF;
            Ok((width, height, false))
        }
        _ => Err(malformed(FileFormat::WebP, "unknown first chunk")),
    }
}

fn riff_chunk(kind: &[u8; 4], body: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let len = u32::try_from(body.len()).map_err(|_| MetadataError::PayloadTooLarge(body.len()))?;
    let mut out = Vec::with_capacity(9 + body.len());
    out.extend_from_slice(kind);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    Ok(out)
}

fn splice_webp(data: &[u8], tiff: &[u8]) -> Result<Vec<u8>, MetadataError> {
    let chunks = riff_chunks(data)?;
    let Some(first) = chunks.first() else {
        return Err(malformed(FileFormat::WebP, "no chunks"));
    };

    let mut body = Vec::with_capacity(data.len() + tiff.len() + 32);
    body.extend_from_slice(b"WEBP");

    if &first.kind == b"VP8X" {
        let mut vp8x = data[first.start..first.end].to_vec();
        if vp8x.len() < 9 {
            return Err(malformed(FileFormat::WebP, "short VP8X chunk"));
        }
        vp8x[8] |= VP8X_FLAG_EXIF;
        body.extend_from_slice(&vp8x);
    } else {
        let (width, height, alpha) = simple_webp_canvas(&first.kind, &data[first.data_start..first.end])?;
        let mut vp8x = [0u8; 10];
        vp8x[0] = VP8X_FLAG_EXIF | if alpha { VP8X_FLAG_ALPHA } else { 0 };
        vp8x[4..7].copy_from_slice(&(width - 1).to_le_bytes()[..3]);
        vp8x[7..10].copy_from_slice(&(height - 1).to_le_bytes()[..3]);
        body.extend_from_slice(&riff_chunk(b"VP8X", &vp8x)?);
        body.extend_from_slice(&data[first.start..first.end]);
    }

    for chunk in chunks.iter().skip(1).filter(|c| &c.kind != b"EXIF") {
        body.extend_from_slice(&data[chunk.start..chunk.end]);
    }
    body.extend_from_slice(&riff_chunk(b"EXIF", tiff)?);

    let riff_len = u32::try_from(body.len()).map_err(|_| MetadataError::PayloadTooLarge(body.len()))?;
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}
