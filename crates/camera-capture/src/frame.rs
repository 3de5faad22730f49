//! JPEG frame processing

use crate::orientation::Rotation;
use crate::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// Re-encoded frame after rotation
#[derive(Debug, Clone)]
pub struct RotatedJpeg {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Read width and height from the JPEG header without decoding pixels
pub fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .into_dimensions()
        .ok()
}

/// Decode, rotate clockwise, and re-encode a JPEG frame
pub fn rotate_jpeg(data: &[u8], rotation: Rotation, quality: u8) -> Result<RotatedJpeg, CameraError> {
    let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();

    let rotated = match rotation {
        Rotation::Deg0 => decoded,
        Rotation::Deg90 => imageops::rotate90(&decoded),
        Rotation::Deg180 => imageops::rotate180(&decoded),
        Rotation::Deg270 => imageops::rotate270(&decoded),
    };

    Ok(RotatedJpeg {
        width: rotated.width(),
        height: rotated.height(),
        data: encode_jpeg(&rotated, quality)?,
    })
}

/// Encode an RGB image as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut out = Vec::with_capacity((image.width() * image.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(image)?;
    Ok(out)
}

/// Color-bar test pattern with a bar that moves with `frame_index`
pub fn test_pattern(width: u32, height: u32, frame_index: u64) -> RgbImage {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];
    let bar_width = (width / BARS.len() as u32).max(1);
    let marker_row = (frame_index % height.max(1) as u64) as u32;

    RgbImage::from_fn(width, height, |x, y| {
        if y == marker_row || y + 1 == marker_row {
            return image::Rgb([16, 16, 16]);
        }
        // Top-left quadrant stays dark so orientation is visible
        if x < width / 4 && y < height / 4 {
            return image::Rgb([32, 32, 32]);
        }
        let bar = ((x / bar_width) as usize).min(BARS.len() - 1);
        image::Rgb(BARS[bar])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        encode_jpeg(&test_pattern(width, height, 0), 90).unwrap()
    }

    #[test]
    fn test_dimensions_from_header() {
        let jpeg = sample_jpeg(64, 48);
        assert_eq!(jpeg_dimensions(&jpeg), Some((64, 48)));
        assert_eq!(jpeg_dimensions(b"not a jpeg"), None);
    }

    #[test]
    fn test_quarter_turn_swaps_dimensions() {
        let jpeg = sample_jpeg(64, 48);

        let rotated = rotate_jpeg(&jpeg, Rotation::Deg90, 90).unwrap();
        assert_eq!((rotated.width, rotated.height), (48, 64));
        assert_eq!(jpeg_dimensions(&rotated.data), Some((48, 64)));

        let flipped = rotate_jpeg(&jpeg, Rotation::Deg180, 90).unwrap();
        assert_eq!((flipped.width, flipped.height), (64, 48));

        let back = rotate_jpeg(&jpeg, Rotation::Deg270, 90).unwrap();
        assert_eq!((back.width, back.height), (48, 64));
    }

    #[test]
    fn test_rotation_moves_dark_corner() {
        let jpeg = sample_jpeg(80, 40);
        let rotated = rotate_jpeg(&jpeg, Rotation::Deg90, 95).unwrap();
        let img = image::load_from_memory(&rotated.data).unwrap().to_rgb8();

        // Clockwise turn moves the top-left corner to the top-right
        let top_right = img.get_pixel(rotated.width - 2, 2);
        let top_left = img.get_pixel(2, 2);
        assert!(top_right[0] < 80);
        assert!(top_left[0] > 150 || top_left[2] > 150);
    }

    #[test]
    fn test_corrupt_input_fails() {
        let result = rotate_jpeg(&[0xFF, 0xD8, 0x00, 0x01], Rotation::Deg90, 90);
        assert!(matches!(result, Err(CameraError::Image(_))));
    }
}
