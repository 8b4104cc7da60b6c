//! 标注 - severity coloured boxes and JPEG encoding of analysed frames

use super::detection::Detection;
use super::error::InspectionError;
use super::session::FrameRef;
use super::severity::Severity;
use image::{ImageOutputFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::sync::Arc;

pub const JPEG_QUALITY: u8 = 85;
const BOX_THICKNESS: i32 = 2;
const TAB_HEIGHT: u32 = 6;

/// Decodes JPEG / PNG / BMP bytes into RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InspectionError> {
    if bytes.is_empty() {
        return Err(InspectionError::InvalidInput("empty image data".to_string()));
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn draw_detections(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut out = frame.clone();
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return out;
    }

    for det in detections {
        let (r, g, b) = Severity::of(&det.class_name).color();
        let color = Rgb([r, g, b]);

        let x1 = det.bbox[0].max(0.0) as i32;
        let y1 = det.bbox[1].max(0.0) as i32;
        let x2 = (det.bbox[2] as i32).min(w as i32 - 1);
        let y2 = (det.bbox[3] as i32).min(h as i32 - 1);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        for t in 0..BOX_THICKNESS {
            let bw = (x2 - x1 - 2 * t).max(1) as u32;
            let bh = (y2 - y1 - 2 * t).max(1) as u32;
            draw_hollow_rect_mut(&mut out, Rect::at(x1 + t, y1 + t).of_size(bw, bh), color);
        }

        // 标签底色条，宽度与置信度成比例
        let tab_w = (((x2 - x1) as f32) * det.confidence.clamp(0.0, 1.0)).max(1.0) as u32;
        let tab_y = (y1 - TAB_HEIGHT as i32).max(0);
        draw_filled_rect_mut(&mut out, Rect::at(x1, tab_y).of_size(tab_w, TAB_HEIGHT), color);
    }
    out
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, InspectionError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
    Ok(buffer.into_inner())
}

/// Draws the boxes and returns the shared JPEG used by every event from
/// this frame.
pub fn annotate_frame(frame: &RgbImage, detections: &[Detection]) -> Result<FrameRef, InspectionError> {
    let annotated = draw_detections(frame, detections);
    let jpeg = encode_jpeg(&annotated, JPEG_QUALITY)?;
    Ok(Arc::from(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxes_use_severity_colour() {
        let frame = RgbImage::new(50, 50);
        let dets = vec![Detection::new("corrosion", 0.9, [10.0, 10.0, 40.0, 40.0])];
        let out = draw_detections(&frame, &dets);

        assert_eq!(out.get_pixel(10, 25).0, [0xD6, 0x28, 0x39]);
        assert_eq!(out.get_pixel(25, 25).0, [0, 0, 0]);
    }

    #[test]
    fn test_degenerate_boxes_ignored() {
        let frame = RgbImage::new(20, 20);
        let dets = vec![
            Detection::new("debris", 0.5, [15.0, 15.0, 5.0, 5.0]),
            Detection::new("debris", 0.5, [100.0, 100.0, 200.0, 200.0]),
        ];
        assert_eq!(draw_detections(&frame, &dets), frame);
    }

    #[test]
    fn test_jpeg_roundtrip() {
        let frame = RgbImage::from_pixel(16, 12, Rgb([20, 120, 200]));
        let jpeg = annotate_frame(&frame, &[]).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (16, 12));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_image(&[]), Err(InspectionError::InvalidInput(_))));
        assert!(matches!(decode_image(b"not an image"), Err(InspectionError::Image(_))));
    }
}
