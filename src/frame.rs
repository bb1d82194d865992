//! Frame helpers: plate crops and the idle placeholder.
//!
//! Frames travel through the pipeline as `image::RgbImage`. Plate boxes come
//! back from the plate detector in frame pixels and are cropped with a margin
//! so characters touching the plate border are not cut off.

use image::{imageops, RgbImage};

use crate::detect::PixelBox;

pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// Crop `bbox` grown by `padding` on each side, clamped to the frame.
///
/// Returns `None` when the clamped region is empty.
pub fn crop_padded(frame: &RgbImage, bbox: &PixelBox, padding: u32) -> Option<RgbImage> {
    let region = bbox.padded(padding, frame.width(), frame.height());
    if region.width() == 0 || region.height() == 0 {
        return None;
    }
    Some(imageops::crop_imm(frame, region.x1, region.y1, region.width(), region.height()).to_image())
}

/// Black frame streamed while no source is loaded.
pub fn placeholder_frame() -> RgbImage {
    RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn crop_includes_padding() {
        let frame = RgbImage::from_pixel(100, 80, Rgb([9, 9, 9]));
        let crop = crop_padded(&frame, &PixelBox::new(20, 20, 40, 30), 15).unwrap();
        assert_eq!(crop.dimensions(), (50, 40));
    }

    #[test]
    fn crop_is_clamped_at_edges() {
        let frame = RgbImage::new(100, 80);
        let crop = crop_padded(&frame, &PixelBox::new(90, 70, 120, 95), 15).unwrap();
        assert_eq!(crop.dimensions(), (25, 25));
    }

    #[test]
    fn box_outside_frame_has_no_crop() {
        let frame = RgbImage::new(100, 80);
        assert!(crop_padded(&frame, &PixelBox::new(200, 200, 220, 210), 15).is_none());
    }

    #[test]
    fn placeholder_is_black() {
        let frame = placeholder_frame();
        assert_eq!(frame.dimensions(), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
