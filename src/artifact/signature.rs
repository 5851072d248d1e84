// src/artifact/signature.rs

//! Header/trailer checks for the supported output formats.
//!
//! Only the first and last [`EDGE_LEN`] bytes of a file are inspected, which
//! is enough to tell a complete file from a truncated or foreign one.

use crate::types::OutputFormat;

/// Size of the head and tail windows handed to [`inspect`].
pub const EDGE_LEN: usize = 64;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
/// `IEND` chunk type followed by its fixed CRC.
const PNG_IEND: &[u8] = b"IEND\xae\x42\x60\x82";
/// Signature + IHDR chunk + IEND chunk.
const PNG_MIN_LEN: u64 = 8 + 25 + 12;

const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
const JPEG_EOI: &[u8] = &[0xFF, 0xD9];

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Check that `head`/`tail` look like a complete file of `format`.
///
/// Returns the image dimensions when the header carries them, or a short
/// reason when the file does not match.
pub fn inspect(
    format: OutputFormat,
    head: &[u8],
    tail: &[u8],
    size: u64,
) -> Result<Option<Dimensions>, String> {
    match format {
        OutputFormat::Png => inspect_png(head, tail, size).map(Some),
        OutputFormat::Jpeg => inspect_jpeg(head, tail).map(|()| None),
        OutputFormat::Svg => inspect_svg(head, tail).map(|()| None),
    }
}

fn inspect_png(head: &[u8], tail: &[u8], size: u64) -> Result<Dimensions, String> {
    if !head.starts_with(PNG_SIGNATURE) {
        return Err("missing PNG signature".to_string());
    }
    if size < PNG_MIN_LEN || head.len() < 24 {
        return Err(format!("PNG too short ({size} bytes)"));
    }
    if &head[12..16] != b"IHDR" {
        return Err("first PNG chunk is not IHDR".to_string());
    }
    let width = u32::from_be_bytes([head[16], head[17], head[18], head[19]]);
    let height = u32::from_be_bytes([head[20], head[21], head[22], head[23]]);
    if width == 0 || height == 0 {
        return Err(format!("PNG has empty dimensions {width}x{height}"));
    }
    if !tail.ends_with(PNG_IEND) {
        return Err("PNG is truncated (no IEND chunk)".to_string());
    }
    Ok(Dimensions { width, height })
}

fn inspect_jpeg(head: &[u8], tail: &[u8]) -> Result<(), String> {
    if !head.starts_with(JPEG_SOI) {
        return Err("missing JPEG start-of-image marker".to_string());
    }
    if !tail.ends_with(JPEG_EOI) {
        return Err("JPEG is truncated (no end-of-image marker)".to_string());
    }
    Ok(())
}

fn inspect_svg(head: &[u8], tail: &[u8]) -> Result<(), String> {
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head).trim_ascii_start();
    if !(head.starts_with(b"<?xml") || head.starts_with(b"<svg")) {
        return Err("does not start with an XML declaration or <svg>".to_string());
    }
    if !tail.trim_ascii_end().ends_with(b"</svg>") {
        return Err("SVG is truncated (no closing </svg>)".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes.extend_from_slice(&[0, 0, 0, 0]); // crc, not checked
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(PNG_IEND);
        bytes
    }

    fn check(format: OutputFormat, bytes: &[u8]) -> Result<Option<Dimensions>, String> {
        let head = &bytes[..bytes.len().min(EDGE_LEN)];
        let tail = &bytes[bytes.len().saturating_sub(EDGE_LEN)..];
        inspect(format, head, tail, bytes.len() as u64)
    }

    #[test]
    fn png_dimensions_are_extracted() {
        let dims = check(OutputFormat::Png, &png(800, 1100)).unwrap();
        assert_eq!(
            dims,
            Some(Dimensions {
                width: 800,
                height: 1100
            })
        );
    }

    #[test]
    fn truncated_png_is_rejected() {
        let mut bytes = png(4, 4);
        bytes.truncate(bytes.len() - 4);
        let err = check(OutputFormat::Png, &bytes).unwrap_err();
        assert!(err.contains("too short") || err.contains("IEND"), "{err}");
    }

    #[test]
    fn zero_sized_png_is_rejected() {
        assert!(check(OutputFormat::Png, &png(0, 10)).is_err());
    }

    #[test]
    fn foreign_bytes_are_rejected_for_every_format() {
        let junk = b"Traceback (most recent call last):\n  boom\n";
        for format in OutputFormat::ALL {
            assert!(check(format, junk).is_err(), "{format} accepted junk");
        }
    }

    #[test]
    fn jpeg_markers() {
        let ok = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
        assert_eq!(check(OutputFormat::Jpeg, &ok), Ok(None));
        assert!(check(OutputFormat::Jpeg, &ok[..6]).is_err());
    }

    #[test]
    fn svg_allows_bom_and_whitespace() {
        let svg = b"\xef\xbb\xbf\n  <svg xmlns=\"http://www.w3.org/2000/svg\"></svg>\n";
        assert_eq!(check(OutputFormat::Svg, svg), Ok(None));

        let xml = b"<?xml version=\"1.0\"?><svg></svg>";
        assert_eq!(check(OutputFormat::Svg, xml), Ok(None));

        assert!(check(OutputFormat::Svg, b"<svg><g>").is_err());
    }
}
