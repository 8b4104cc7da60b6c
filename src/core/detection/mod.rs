//! 检测源 - black-box object detectors that turn one RGB frame into labelled boxes

pub mod model;
pub mod replay;
#[cfg(feature = "onnx")]
pub mod yolo;

use super::error::InspectionError;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use model::{ModelManager, ModelSource};
pub use replay::ReplayDetector;
#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in pixels of the analysed frame
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }
}

/// 单帧上下文：帧序号（视频从 1 开始，图片为 0）
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameContext {
    pub frame_number: u64,
}

pub trait Detector: Send + Sync {
    /// Detections on one frame with confidence ≥ `conf_threshold`.
    fn detect(
        &self,
        frame: &RgbImage,
        ctx: FrameContext,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>, InspectionError>;

    /// Class names the detector can emit, indexed by class id.
    fn class_names(&self) -> Vec<String>;

    /// Human readable model label shown in reports.
    fn label(&self) -> String;
}

pub struct MockDetector {
    // 按帧序号返回预设检测结果
    pattern: Box<dyn Fn(u64) -> Vec<Detection> + Send + Sync>,
}

impl MockDetector {
    pub fn new() -> Self {
        Self {
            pattern: Box::new(|_| Vec::new()),
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<Detection> + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(pattern),
        }
    }

    /// Same detections on every frame.
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::with_pattern(move |_| detections.clone())
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for MockDetector {
    fn detect(
        &self,
        _frame: &RgbImage,
        ctx: FrameContext,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>, InspectionError> {
        Ok((self.pattern)(ctx.frame_number)
            .into_iter()
            .filter(|d| d.confidence >= conf_threshold)
            .collect())
    }

    fn class_names(&self) -> Vec<String> {
        super::severity::CLASS_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn label(&self) -> String {
        "Mock Detector".to_string()
    }
}
