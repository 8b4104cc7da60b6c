//! Thin top-down drawing surface over printpdf (A4, millimetres from the top edge).

use crate::core::error::InspectionError;
use image::DynamicImage;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rect, Rgb,
};
use std::io::BufWriter;

pub const PAGE_W: f32 = 210.0;
pub const PAGE_H: f32 = 297.0;
pub const MARGIN: f32 = 15.0;
pub const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;

const PT_TO_MM: f32 = 0.3528;
const IMAGE_DPI: f32 = 300.0;
/// 嵌入前缩小过大的帧
const MAX_EMBED_PX: u32 = 1200;

pub type Rgb8 = (u8, u8, u8);

pub struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    cursor: f32,
    pages: usize,
}

impl Canvas {
    pub fn new(title: &str) -> Result<Self, InspectionError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            cursor: MARGIN,
            pages: 1,
        })
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Distance of the cursor from the top edge.
    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn advance(&mut self, h: f32) {
        self.cursor += h;
    }

    pub fn remaining(&self) -> f32 {
        PAGE_H - MARGIN - self.cursor
    }

    pub fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = MARGIN;
        self.pages += 1;
    }

    /// Starts a new page unless `h` still fits (or the page is still empty).
    pub fn keep_together(&mut self, h: f32) {
        if h > self.remaining() && self.cursor > MARGIN {
            self.new_page();
        }
    }

    fn rect(&self, x: f32, top: f32, w: f32, h: f32, mode: PaintMode) {
        let rect = Rect::new(Mm(x), Mm(PAGE_H - top - h), Mm(x + w), Mm(PAGE_H - top)).with_mode(mode);
        self.layer.add_rect(rect);
    }

    pub fn fill_rect(&self, x: f32, top: f32, w: f32, h: f32, color: Rgb8) {
        self.layer.set_fill_color(rgb(color));
        self.rect(x, top, w, h, PaintMode::Fill);
    }

    pub fn stroke_rect(&self, x: f32, top: f32, w: f32, h: f32, color: Rgb8, thickness_pt: f32) {
        self.layer.set_outline_color(rgb(color));
        self.layer.set_outline_thickness(thickness_pt);
        self.rect(x, top, w, h, PaintMode::Stroke);
    }

    /// Horizontal rule across the content width at the cursor.
    pub fn rule(&mut self, thickness_pt: f32, color: Rgb8, space_after: f32) {
        let h = thickness_pt * PT_TO_MM;
        self.fill_rect(MARGIN, self.cursor, CONTENT_W, h, color);
        self.cursor += h + space_after;
    }

    /// `baseline` is measured from the top edge.
    pub fn text(&self, text: &str, size: f32, bold: bool, color: Rgb8, x: f32, baseline: f32) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(rgb(color));
        self.layer
            .use_text(pdf_safe(text), size, Mm(x), Mm(PAGE_H - baseline), font);
    }

    pub fn text_centered(&self, text: &str, size: f32, bold: bool, color: Rgb8, center_x: f32, baseline: f32) {
        let x = center_x - text_width(text, size, bold) / 2.0;
        self.text(text, size, bold, color, x, baseline);
    }

    pub fn text_right(&self, text: &str, size: f32, bold: bool, color: Rgb8, right_x: f32, baseline: f32) {
        let x = right_x - text_width(text, size, bold);
        self.text(text, size, bold, color, x, baseline);
    }

    /// Places `image` with its top-left corner at (`x`, `top`), `w` x `h` mm.
    pub fn image(&self, image: &DynamicImage, x: f32, top: f32, w: f32, h: f32) {
        let embedded = if image.width() > MAX_EMBED_PX {
            image.resize(MAX_EMBED_PX, MAX_EMBED_PX, image::imageops::FilterType::Triangle)
        } else {
            image.clone()
        };
        let (px_w, px_h) = (embedded.width().max(1) as f32, embedded.height().max(1) as f32);
        let natural_w = px_w / IMAGE_DPI * 25.4;
        let natural_h = px_h / IMAGE_DPI * 25.4;

        Image::from_dynamic_image(&embedded).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(PAGE_H - top - h)),
                scale_x: Some(w / natural_w),
                scale_y: Some(h / natural_h),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }

    pub fn finish(self) -> Result<Vec<u8>, InspectionError> {
        let mut writer = BufWriter::new(Vec::new());
        self.doc.save(&mut writer)?;
        writer
            .into_inner()
            .map_err(|e| InspectionError::Report(e.to_string()))
    }
}

fn rgb((r, g, b): Rgb8) -> Color {
    Color::Rgb(Rgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, None))
}

/// Rough Helvetica advance width in mm.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let em = if bold { 0.56 } else { 0.52 };
    text.chars().count() as f32 * size * em * PT_TO_MM
}

/// Builtin fonts only cover plain ASCII.
pub fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '—' | '–' => '-',
            '·' => '|',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

/// Shortens `text` with "..." so it fits in `max_w` mm.
pub fn fit_text(text: &str, size: f32, bold: bool, max_w: f32) -> String {
    if text_width(text, size, bold) <= max_w {
        return text.to_string();
    }
    let mut out: String = text.to_string();
    while !out.is_empty() && text_width(&format!("{}...", out), size, bold) > max_w {
        out.pop();
    }
    format!("{}...", out)
}
