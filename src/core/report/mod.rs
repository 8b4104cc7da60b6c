//! PDF 巡检报告
//!
//! Hero banner, mission details, executive summary tiles, class breakdown,
//! one block per logged event (on its own pages) and a footer.

pub mod canvas;

use super::config::MissionInfo;
use super::error::InspectionError;
use super::session::{class_counts, severity_summary, AnomalyEvent, SessionLog};
use super::severity::{display_name, Severity};
use canvas::{fit_text, Canvas, Rgb8, CONTENT_W, MARGIN, PAGE_W};
use chrono::NaiveDateTime;
use log::{debug, info};

pub const DARK_NAVY: Rgb8 = (0x0A, 0x16, 0x28);
pub const NAVY_MID: Rgb8 = (0x1A, 0x33, 0x55);
pub const TEAL: Rgb8 = (0x00, 0xB4, 0xAA);
pub const GREY_BG: Rgb8 = (0xF5, 0xF7, 0xFA);
pub const GREY_BORDER: Rgb8 = (0xDD, 0xE3, 0xEC);
pub const GREY_TEXT: Rgb8 = (0x5A, 0x64, 0x78);
const HERO_META: Rgb8 = (0x6A, 0xAF, 0xAF);
const WHITE: Rgb8 = (0xFF, 0xFF, 0xFF);
const BLACK: Rgb8 = (0x1E, 0x1E, 0x1E);

pub const FRAMEWORK: &str = "YOLOv8 + ONNX Runtime";

const ROW_H: f32 = 9.0;
const IMAGE_MAX_W: f32 = CONTENT_W - 10.0;
const IMAGE_MAX_H: f32 = 90.0;

pub struct ReportRenderer {
    mission: MissionInfo,
    model_label: String,
}

impl ReportRenderer {
    pub fn new(mission: MissionInfo, model_label: impl Into<String>) -> Self {
        Self {
            mission,
            model_label: model_label.into(),
        }
    }

    pub fn render_log(&self, log: &SessionLog, now: NaiveDateTime) -> Result<Vec<u8>, InspectionError> {
        self.render(log.events(), now)
    }

    pub fn render(&self, events: &[AnomalyEvent], now: NaiveDateTime) -> Result<Vec<u8>, InspectionError> {
        info!("📄 Rendering report: {} events, mission '{}'", events.len(), self.mission.name);

        let mut canvas = Canvas::new("NautiCAI Inspection Report")?;
        self.hero(&mut canvas, now);
        self.mission_details(&mut canvas, now);

        self.summary(&mut canvas, events);
        self.breakdown(&mut canvas, events);

        if !events.is_empty() {
            canvas.new_page();
            section_title(&mut canvas, "Detailed Anomaly Log", true);
            for (i, event) in events.iter().enumerate() {
                self.event_block(&mut canvas, i + 1, event);
            }
        }

        self.footer(&mut canvas, now);
        let pages = canvas.pages();
        let bytes = canvas.finish()?;
        info!("✅ Report rendered: {} pages, {} bytes", pages, bytes.len());
        Ok(bytes)
    }

    fn hero(&self, c: &mut Canvas, now: NaiveDateTime) {
        let top = c.cursor();
        let h = 40.0;
        let center = PAGE_W / 2.0;
        c.fill_rect(MARGIN, top, CONTENT_W, h, DARK_NAVY);
        c.text_centered("NautiCAI", 32.0, true, WHITE, center, top + 18.0);
        c.text_centered(
            "Underwater Hazard Detection Report - Explore Safer Seas Now",
            11.0,
            false,
            TEAL,
            center,
            top + 27.0,
        );
        let meta = format!(
            "{}  |  {}  |  {}",
            now.format("%d %B %Y"),
            self.mission.name,
            self.mission.location
        );
        c.text_centered(&fit_text(&meta, 8.0, false, CONTENT_W - 10.0), 8.0, false, HERO_META, center, top + 34.0);
        c.advance(h);
        c.rule(4.0, TEAL, 5.0);
    }

    fn mission_details(&self, c: &mut Canvas, now: NaiveDateTime) {
        section_title(c, "Mission Details", true);
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M:%S").to_string();
        let rows: [[&str; 4]; 4] = [
            ["Mission Name", self.mission.name.as_str(), "Date", date.as_str()],
            ["Operator", self.mission.operator.as_str(), "Time", time.as_str()],
            ["Vessel / ROV", self.mission.vessel.as_str(), "Location", self.mission.location.as_str()],
            ["AI Model", self.model_label.as_str(), "Framework", FRAMEWORK],
        ];
        for (i, row) in rows.iter().enumerate() {
            key_value_row(c, row, i % 2 == 1);
        }
        c.advance(5.0);
    }

    fn summary(&self, c: &mut Canvas, events: &[AnomalyEvent]) {
        section_title(c, "Executive Summary", true);
        let s = severity_summary(events);
        let tiles = [
            ("TOTAL DETECTIONS", s.total, GREY_TEXT, DARK_NAVY, WHITE),
            ("CRITICAL", s.critical, Severity::Critical.color(), Severity::Critical.color(), Severity::Critical.background()),
            ("WARNINGS", s.warning, Severity::Warning.color(), Severity::Warning.color(), Severity::Warning.background()),
            ("NORMAL", s.normal, Severity::Normal.color(), Severity::Normal.color(), Severity::Normal.background()),
        ];

        let top = c.cursor();
        let (w, h) = (CONTENT_W / 4.0, 28.0);
        c.fill_rect(MARGIN, top, CONTENT_W, 3.0 * 0.3528, TEAL);
        let top = top + 1.1;
        for (i, (label, value, label_color, value_color, bg)) in tiles.iter().enumerate() {
            let x = MARGIN + w * i as f32;
            c.fill_rect(x, top, w, h, *bg);
            c.stroke_rect(x, top, w, h, GREY_BORDER, 0.5);
            if i > 0 {
                c.fill_rect(x, top, 0.7, h, *value_color);
            }
            c.text_centered(label, 8.0, true, *label_color, x + w / 2.0, top + 8.0);
            c.text_centered(&value.to_string(), 32.0, true, *value_color, x + w / 2.0, top + 22.0);
        }
        c.advance(h + 1.1);
        c.rule(2.0, GREY_BORDER, 5.0);
    }

    fn breakdown(&self, c: &mut Canvas, events: &[AnomalyEvent]) {
        let counts = class_counts(events);
        if counts.is_empty() {
            return;
        }
        section_title(c, "Detection Breakdown by Class", false);

        let widths = [70.0, 25.0, 40.0, 45.0];
        let total = events.len().max(1) as f32;

        c.keep_together(ROW_H * 2.0);
        let top = c.cursor();
        c.fill_rect(MARGIN, top, CONTENT_W, ROW_H, NAVY_MID);
        let headers = ["Anomaly Class", "Count", "Severity", "Share %"];
        let mut x = MARGIN;
        for (i, header) in headers.iter().enumerate() {
            cell_text(c, header, true, WHITE, x, widths[i], top, i > 0);
            x += widths[i];
        }
        c.advance(ROW_H);

        for (row, (class_name, count)) in counts.iter().enumerate() {
            c.keep_together(ROW_H);
            let top = c.cursor();
            let bg = if row % 2 == 0 { WHITE } else { GREY_BG };
            c.fill_rect(MARGIN, top, CONTENT_W, ROW_H, bg);

            let severity = Severity::of(class_name);
            let cells = [
                (display_name(class_name), false, BLACK),
                (count.to_string(), false, BLACK),
                (severity.label().to_string(), true, severity.color()),
                (format!("{:.1}%", *count as f32 / total * 100.0), false, BLACK),
            ];
            let mut x = MARGIN;
            for (i, (text, bold, color)) in cells.iter().enumerate() {
                c.stroke_rect(x, top, widths[i], ROW_H, GREY_BORDER, 0.5);
                cell_text(c, text, *bold, *color, x, widths[i], top, i > 0);
                x += widths[i];
            }
            c.advance(ROW_H);
        }
        c.advance(5.0);
    }

    fn event_block(&self, c: &mut Canvas, index: usize, event: &AnomalyEvent) {
        let severity = event.severity();
        let name = display_name(&event.class_name);
        let confidence = format!("{:.1}%", event.confidence * 100.0);

        // 解码失败的帧直接省略
        let frame = image::load_from_memory(&event.frame).ok();
        let image_size = frame.as_ref().map(|img| {
            let (w, h) = (img.width().max(1) as f32, img.height().max(1) as f32);
            let ratio = (IMAGE_MAX_W / w).min(IMAGE_MAX_H / h);
            (w * ratio, h * ratio)
        });
        if frame.is_none() {
            debug!("event #{} has no decodable frame", index);
        }

        let header_h = 11.0;
        let image_block_h = image_size.map_or(0.0, |(_, h)| h + 24.0);
        c.keep_together(header_h + ROW_H * 2.0 + image_block_h + 5.0);

        let top = c.cursor();
        c.fill_rect(MARGIN, top, CONTENT_W, header_h, severity.color());
        let title = fit_text(
            &format!("Detection #{:02} - {}", index, name),
            9.0,
            true,
            CONTENT_W * 0.75,
        );
        c.text(&title, 9.0, true, WHITE, MARGIN + 5.0, top + 7.0);
        c.text_right(severity.label(), 10.0, true, WHITE, MARGIN + CONTENT_W - 5.0, top + 7.2);
        c.advance(header_h);

        key_value_row(c, &["Timestamp", event.timestamp.as_str(), "Class", name.as_str()], false);
        let top = c.cursor();
        key_value_row(c, &["Confidence", confidence.as_str(), "Severity", ""], true);
        c.text(
            severity.label(),
            9.0,
            true,
            severity.color(),
            MARGIN + 30.0 + 60.0 + 30.0 + 3.5,
            top + 6.0,
        );

        if let (Some(img), Some((w, h))) = (frame, image_size) {
            let top = c.cursor();
            let block_h = h + 24.0;
            c.fill_rect(MARGIN, top, CONTENT_W, block_h, severity.background());
            c.stroke_rect(MARGIN, top, CONTENT_W, block_h, GREY_BORDER, 0.5);
            c.fill_rect(MARGIN, top, CONTENT_W, 1.0, severity.color());

            c.image(&img, MARGIN + (CONTENT_W - w) / 2.0, top + 5.0, w, h);
            let caption = format!(
                "AI-Annotated Frame  |  {}  |  Confidence {}  |  Detected at {}",
                name, confidence, event.timestamp
            );
            c.text_centered(
                &fit_text(&caption, 8.0, true, CONTENT_W - 6.0),
                8.0,
                true,
                GREY_TEXT,
                PAGE_W / 2.0,
                top + h + 15.0,
            );
            c.advance(block_h);
        }
        c.advance(5.0);
    }

    fn footer(&self, c: &mut Canvas, now: NaiveDateTime) {
        c.keep_together(12.0);
        c.advance(4.0);
        c.rule(1.0, GREY_BORDER, 2.0);
        let text = format!(
            "Generated by NautiCAI  |  {}  |  Confidential Inspection Report  |  www.nauticai-ai.com",
            now.format("%Y-%m-%d %H:%M:%S")
        );
        let baseline = c.cursor() + 3.0;
        c.text_centered(&text, 8.0, false, GREY_TEXT, PAGE_W / 2.0, baseline);
        c.advance(5.0);
    }
}

fn section_title(c: &mut Canvas, title: &str, teal_rule: bool) {
    c.keep_together(20.0);
    c.advance(3.5);
    let baseline = c.cursor() + 4.0;
    c.text(title, 12.0, true, DARK_NAVY, MARGIN, baseline);
    c.advance(6.5);
    if teal_rule {
        c.rule(2.0, TEAL, 3.0);
    } else {
        c.rule(1.0, GREY_BORDER, 2.0);
    }
}

/// Four cell row: label, value, label, value (30 / 60 / 30 / 60 mm).
fn key_value_row(c: &mut Canvas, cells: &[&str; 4], shaded: bool) {
    let widths = [30.0, 60.0, 30.0, 60.0];
    let top = c.cursor();
    let mut x = MARGIN;
    for (i, text) in cells.iter().enumerate() {
        let is_label = i % 2 == 0;
        let bg = if is_label || shaded { GREY_BG } else { WHITE };
        c.fill_rect(x, top, widths[i], ROW_H, bg);
        c.stroke_rect(x, top, widths[i], ROW_H, GREY_BORDER, 0.5);
        cell_text(c, text, is_label, BLACK, x, widths[i], top, false);
        x += widths[i];
    }
    c.advance(ROW_H);
}

#[allow(clippy::too_many_arguments)]
fn cell_text(c: &Canvas, text: &str, bold: bool, color: Rgb8, x: f32, w: f32, top: f32, centered: bool) {
    let fitted = fit_text(text, 9.0, bold, w - 6.0);
    let baseline = top + 6.0;
    if centered {
        c.text_centered(&fitted, 9.0, bold, color, x + w / 2.0, baseline);
    } else {
        c.text(&fitted, 9.0, bold, color, x + 3.5, baseline);
    }
}
