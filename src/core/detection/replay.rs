use super::{Detection, Detector, FrameContext};
use crate::core::error::InspectionError;
use crate::core::severity::CLASS_NAMES;
use image::RgbImage;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Replays detections recorded earlier (for example exported from another
/// inference run), keyed by frame number. Images use frame 0.
///
/// ```json
/// { "label": "YOLOv8s export", "frames": { "0": [ { "class_name": "debris", "confidence": 0.61, "bbox": [10, 20, 80, 90] } ] } }
/// ```
pub struct ReplayDetector {
    label: String,
    frames: HashMap<u64, Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    #[serde(default)]
    label: Option<String>,
    frames: HashMap<u64, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn new(frames: HashMap<u64, Vec<Detection>>) -> Self {
        Self {
            label: "Recorded Detections".to_string(),
            frames,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, InspectionError> {
        let file: ReplayFile = serde_json::from_str(json)?;
        for (frame, detections) in &file.frames {
            if let Some(bad) = detections
                .iter()
                .find(|d| !(0.0..=1.0).contains(&d.confidence))
            {
                return Err(InspectionError::InvalidInput(format!(
                    "frame {}: confidence {} outside [0, 1]",
                    frame, bad.confidence
                )));
            }
        }

        let mut detector = Self::new(file.frames);
        if let Some(label) = file.label {
            detector.label = label;
        }
        Ok(detector)
    }

    pub fn from_file(path: &Path) -> Result<Self, InspectionError> {
        info!("📖 Loading recorded detections from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        let detector = Self::from_json(&json)?;
        info!("✓ {} frames with recorded detections", detector.frames.len());
        Ok(detector)
    }
}

impl Detector for ReplayDetector {
    fn detect(
        &self,
        _frame: &RgbImage,
        ctx: FrameContext,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>, InspectionError> {
        Ok(self
            .frames
            .get(&ctx.frame_number)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence >= conf_threshold)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = CLASS_NAMES.iter().map(|s| s.to_string()).collect();
        for det in self.frames.values().flatten() {
            if !names.contains(&det.class_name) {
                names.push(det.class_name.clone());
            }
        }
        names
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
