use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::application::ports::OverlayPort;
use crate::domain::detection::Detection;

const PALETTE: [[u8; 3]; 14] = [
    [56, 168, 0],
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [220, 20, 60],
];

/// Boxes plus `"<label> <score>"` tags. Without a font only the boxes are drawn.
pub struct OverlayPainter {
    font: Option<FontVec>,
    scale: PxScale,
    thickness: u32,
}

impl OverlayPainter {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font, scale: PxScale::from(14.0), thickness: 2 }
    }

    pub fn from_font_file(path: Option<&Path>) -> Result<Self> {
        let font = match path {
            Some(p) => {
                let bytes =
                    std::fs::read(p).with_context(|| format!("reading font {}", p.display()))?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|_| anyhow::anyhow!("invalid font file {}", p.display()))?;
                Some(font)
            }
            None => None,
        };
        Ok(Self::new(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn color_for(class_id: usize) -> Rgb<u8> {
        Rgb(PALETTE[class_id % PALETTE.len()])
    }
}

impl OverlayPort for OverlayPainter {
    fn draw(&self, frame: &mut RgbImage, detections: &[Detection]) {
        let (fw, fh) = frame.dimensions();
        if fw == 0 || fh == 0 {
            return;
        }

        for det in detections {
            let Some(rect) = clamp_rect(det, fw, fh) else { continue };
            let color = Self::color_for(det.class_id);

            for t in 0..self.thickness {
                let w = rect.width().saturating_sub(2 * t);
                let h = rect.height().saturating_sub(2 * t);
                if w == 0 || h == 0 {
                    break;
                }
                let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32).of_size(w, h);
                draw_hollow_rect_mut(frame, inner, color);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.label, det.score);
                let (tw, th) = text_size(self.scale, font, &text);
                // Encima de la caja si cabe; si no, dentro.
                let tag_h = th as i32 + 2;
                let ty = if rect.top() >= tag_h { rect.top() - tag_h } else { rect.top() };
                let tag = Rect::at(rect.left(), ty).of_size(tw + 4, th + 2);
                draw_filled_rect_mut(frame, tag, color);
                let white = Rgb([255, 255, 255]);
                draw_text_mut(frame, white, rect.left() + 2, ty, self.scale, font, &text);
            }
        }
    }
}

/// Box in integer frame coordinates, clipped to the frame; `None` if nothing is left.
fn clamp_rect(det: &Detection, fw: u32, fh: u32) -> Option<Rect> {
    let x1 = det.x1.max(0.0).min(fw as f32 - 1.0) as i32;
    let y1 = det.y1.max(0.0).min(fh as f32 - 1.0) as i32;
    let x2 = det.x2.max(0.0).min(fw as f32 - 1.0) as i32;
    let y2 = det.y2.max(0.0).min(fh as f32 - 1.0) as i32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize) -> Detection {
        Detection { x1, y1, x2, y2, score: 0.9, class_id, label: "Stop".into() }
    }

    #[test]
    fn draws_box_outline_in_class_colour() {
        let mut img = RgbImage::new(40, 40);
        OverlayPainter::new(None).draw(&mut img, &[det(5.0, 5.0, 20.0, 20.0, 13)]);
        assert_eq!(img.get_pixel(5, 5), &Rgb(PALETTE[13]));
        assert_eq!(img.get_pixel(20, 12), &Rgb(PALETTE[13]));
        // second ring of the 2px border
        assert_eq!(img.get_pixel(6, 10), &Rgb(PALETTE[13]));
        // interior untouched
        assert_eq!(img.get_pixel(12, 12), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_frame_are_clipped_or_skipped() {
        let mut img = RgbImage::new(16, 16);
        let painter = OverlayPainter::new(None);
        let dets = [det(-10.0, -10.0, 100.0, 100.0, 0), det(30.0, 30.0, 40.0, 40.0, 1)];
        painter.draw(&mut img, &dets);
        assert_eq!(img.get_pixel(0, 0), &Rgb(PALETTE[0]));
        assert_eq!(img.get_pixel(15, 15), &Rgb(PALETTE[0]));
    }

    #[test]
    fn degenerate_box_is_ignored() {
        assert!(clamp_rect(&det(10.0, 10.0, 10.0, 30.0, 0), 64, 64).is_none());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(OverlayPainter::from_font_file(Some(Path::new("/no/such/font.ttf"))).is_err());
        assert!(!OverlayPainter::from_font_file(None).unwrap().has_font());
    }
}
