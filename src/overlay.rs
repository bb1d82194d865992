//! Overlay rendering of stabilized plates onto outgoing frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::PixelBox;

/// One plate drawn on the outgoing stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayItem {
    pub bbox: PixelBox,
    pub text: String,
}

/// Draws plate boxes and their readings onto a frame.
///
/// Implementations that draw the text itself must handle the full Thai
/// character set, not only Latin glyphs.
pub trait OverlayRenderer: Send {
    fn render(&self, frame: &mut RgbImage, items: &[OverlayItem]);
}

/// Green box per plate with a black label band above it.
#[derive(Clone, Debug)]
pub struct BoxOverlay {
    pub color: Rgb<u8>,
    pub thickness: u32,
    pub band_height: u32,
}

impl Default for BoxOverlay {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            thickness: 2,
            band_height: 40,
        }
    }
}

impl OverlayRenderer for BoxOverlay {
    fn render(&self, frame: &mut RgbImage, items: &[OverlayItem]) {
        for item in items {
            let (w, h) = (item.bbox.width(), item.bbox.height());
            for inset in 0..self.thickness {
                let (iw, ih) = (
                    w.saturating_sub(2 * inset),
                    h.saturating_sub(2 * inset),
                );
                if iw == 0 || ih == 0 {
                    break;
                }
                let rect = Rect::at((item.bbox.x1 + inset) as i32, (item.bbox.y1 + inset) as i32)
                    .of_size(iw, ih);
                draw_hollow_rect_mut(frame, rect, self.color);
            }

            if self.band_height == 0 {
                continue;
            }
            let band_width = label_band_width(&item.text).max(w).max(1);
            let band_top = item.bbox.y1 as i32 - self.band_height as i32;
            let band = Rect::at(item.bbox.x1 as i32, band_top).of_size(band_width, self.band_height);
            draw_filled_rect_mut(frame, band, Rgb([0, 0, 0]));
        }
    }
}

fn label_band_width(text: &str) -> u32 {
    (text.chars().count() as u32).saturating_mul(18)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_box_outline() {
        let mut frame = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let item = OverlayItem {
            bbox: PixelBox::new(50, 100, 150, 150),
            text: "1กก 1234".to_string(),
        };
        BoxOverlay::default().render(&mut frame, &[item]);

        assert_eq!(frame.get_pixel(50, 120), &Rgb([0, 255, 0]));
        assert_eq!(frame.get_pixel(51, 120), &Rgb([0, 255, 0]));
        assert_eq!(frame.get_pixel(100, 125), &Rgb([255, 255, 255]));
        // Label band above the box.
        assert_eq!(frame.get_pixel(60, 80), &Rgb([0, 0, 0]));
    }

    #[test]
    fn band_is_clipped_at_top_edge() {
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let item = OverlayItem {
            bbox: PixelBox::new(10, 5, 60, 40),
            text: "AB".to_string(),
        };
        BoxOverlay::default().render(&mut frame, &[item]);
        assert_eq!(frame.get_pixel(20, 2), &Rgb([0, 0, 0]));
    }
}
