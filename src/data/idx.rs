//! Readers and writers for the IDX binary format used to store the image and
//! label arrays of each split.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```
use std::path::Path;

use crate::error::{FerError, Result};
use crate::math::volume::Volume;

const UBYTE: u8 = 0x08;

fn read_be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn check_header(bytes: &[u8], dims: u8, header_len: usize, what: &str) -> std::result::Result<(), String> {
    if bytes.len() < header_len {
        return Err(format!(
            "IDX {} file too short: expected at least {} header bytes, got {}",
            what, header_len, bytes.len()
        ));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(format!(
            "IDX {} file: bytes 0-1 must be 0x00 0x00, got 0x{:02X} 0x{:02X}",
            what, bytes[0], bytes[1]
        ));
    }
    if bytes[2] != UBYTE {
        return Err(format!("IDX {} file: dtype must be 0x08 (uint8), got 0x{:02X}", what, bytes[2]));
    }
    if bytes[3] != dims {
        return Err(format!("IDX {} file: expected {} dimensions, got {}", what, dims, bytes[3]));
    }
    Ok(())
}

/// Decodes an IDX3 image file into single-channel volumes with pixel values
/// scaled from `[0, 255]` to `[0.0, 1.0]`.
pub fn parse_images(bytes: &[u8]) -> std::result::Result<Vec<Volume>, String> {
    check_header(bytes, 3, 16, "image")?;
    let n_items = read_be_u32(bytes, 4);
    let rows = read_be_u32(bytes, 8);
    let cols = read_be_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .ok_or_else(|| format!("IDX image file: rows * cols overflows (rows={}, cols={})", rows, cols))?;
    let needed = n_items
        .checked_mul(n_pixels)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| "IDX image file: data length overflows".to_owned())?;
    if bytes.len() < needed {
        return Err(format!(
            "IDX image file truncated: header declares {} images of {}x{} ({} bytes), file has {}",
            n_items, rows, cols, needed, bytes.len()
        ));
    }
    if n_pixels == 0 && n_items > 0 {
        return Err("IDX image file: images have zero pixels".to_owned());
    }

    bytes[16..needed]
        .chunks_exact(n_pixels.max(1))
        .take(n_items)
        .map(|chunk| {
            let pixels = chunk.iter().map(|&px| px as f64 / 255.0).collect();
            Volume::grayscale(rows, cols, pixels).map_err(|e| e.to_string())
        })
        .collect()
}

/// Decodes an IDX1 label file into raw class indices.
pub fn parse_labels(bytes: &[u8]) -> std::result::Result<Vec<usize>, String> {
    check_header(bytes, 1, 8, "label")?;
    let n_items = read_be_u32(bytes, 4);
    let needed = 8 + n_items;
    if bytes.len() < needed {
        return Err(format!(
            "IDX label file truncated: header declares {} labels, file has {} bytes",
            n_items, bytes.len()
        ));
    }
    Ok(bytes[8..needed].iter().map(|&b| b as usize).collect())
}

/// Encodes images as IDX3. Pixel values are clamped to `[0, 1]` and rounded
/// to the nearest byte.
pub fn encode_images(images: &[Volume]) -> std::result::Result<Vec<u8>, String> {
    let (rows, cols) = images.first().map(|v| (v.height, v.width)).unwrap_or((0, 0));
    if images.iter().any(|v| v.channels != 1 || v.height != rows || v.width != cols) {
        return Err("IDX3 needs single-channel images of one size".to_owned());
    }
    let mut out = vec![0x00, 0x00, UBYTE, 0x03];
    for n in [images.len(), rows, cols] {
        out.extend_from_slice(&(n as u32).to_be_bytes());
    }
    for image in images {
        out.extend(image.data.iter().map(|&x| (x.clamp(0.0, 1.0) * 255.0).round() as u8));
    }
    Ok(out)
}

pub fn encode_labels(labels: &[usize]) -> std::result::Result<Vec<u8>, String> {
    let mut out = vec![0x00, 0x00, UBYTE, 0x01];
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    for &l in labels {
        out.push(u8::try_from(l).map_err(|_| format!("label {} does not fit in a byte", l))?);
    }
    Ok(out)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| FerError::Io { path: path.to_path_buf(), source })
}

pub fn read_images(path: &Path) -> Result<Vec<Volume>> {
    parse_images(&read_file(path)?).map_err(|msg| FerError::load(path, msg))
}

pub fn read_labels(path: &Path) -> Result<Vec<usize>> {
    parse_labels(&read_file(path)?).map_err(|msg| FerError::load(path, msg))
}

pub fn write_images(path: &Path, images: &[Volume]) -> Result<()> {
    let bytes = encode_images(images).map_err(|msg| FerError::load(path, msg))?;
    std::fs::write(path, bytes).map_err(|source| FerError::Io { path: path.to_path_buf(), source })
}

pub fn write_labels(path: &Path, labels: &[usize]) -> Result<()> {
    let bytes = encode_labels(labels).map_err(|msg| FerError::load(path, msg))?;
    std::fs::write(path, bytes).map_err(|source| FerError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_decode_and_normalize() {
        let mut bytes = vec![0, 0, 8, 3, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2];
        bytes.extend_from_slice(&[0, 255, 51, 102]);
        let images = parse_images(&bytes).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].dims(), (1, 1, 2));
        assert_eq!(images[0].data, vec![0.0, 1.0]);
        assert!((images[1].data[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = vec![0, 0, 8, 3, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 2];
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(parse_images(&bytes).unwrap_err().contains("truncated"));
    }

    #[test]
    fn wrong_dimension_byte_is_rejected() {
        let bytes = vec![0, 0, 8, 3, 0, 0, 0, 0];
        assert!(parse_labels(&bytes).is_err());
    }

    #[test]
    fn labels_encode_then_decode() {
        let encoded = encode_labels(&[2, 0, 1]).unwrap();
        assert_eq!(parse_labels(&encoded).unwrap(), vec![2, 0, 1]);
        assert!(encode_labels(&[256]).is_err());
    }
}
