//! 单张图片检测

use super::annotate::{annotate_frame, decode_image};
use super::config::SimulationConfig;
use super::dedup::{ClassTracker, EventDeduplicator};
use super::detection::{Detection, Detector, FrameContext};
use super::error::InspectionError;
use super::session::{FrameRef, SessionLog};
use super::simulate::full_simulation;
use chrono::Local;
use log::{debug, info};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct ImageInspection {
    pub detections: Vec<Detection>,
    /// Annotated frame as JPEG
    pub annotated: FrameRef,
    pub width: u32,
    pub height: u32,
    /// Events appended to the session log by this call
    pub logged: usize,
    /// false when the same image id was already logged
    pub is_new: bool,
}

/// Remembers the last logged image so re-submissions don't log twice.
#[derive(Debug, Default)]
pub struct ImageInspector {
    dedup: EventDeduplicator,
    last_image_id: Option<String>,
}

impl ImageInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_image_id(&self) -> Option<&str> {
        self.last_image_id.as_deref()
    }

    pub fn reset(&mut self) {
        self.last_image_id = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn inspect<R: Rng + ?Sized>(
        &mut self,
        detector: &dyn Detector,
        image_id: &str,
        bytes: &[u8],
        confidence: f32,
        simulation: &SimulationConfig,
        log: &mut SessionLog,
        rng: &mut R,
    ) -> Result<ImageInspection, InspectionError> {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.inspect_at(detector, image_id, bytes, confidence, simulation, log, rng, &timestamp)
    }

    /// Same as [`inspect`](Self::inspect) with an explicit event timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn inspect_at<R: Rng + ?Sized>(
        &mut self,
        detector: &dyn Detector,
        image_id: &str,
        bytes: &[u8],
        confidence: f32,
        simulation: &SimulationConfig,
        log: &mut SessionLog,
        rng: &mut R,
        timestamp: &str,
    ) -> Result<ImageInspection, InspectionError> {
        let is_new = self.last_image_id.as_deref() != Some(image_id);
        let original = decode_image(bytes)?;
        let (width, height) = original.dimensions();

        let image = if simulation.enabled {
            full_simulation(&original, simulation, rng)
        } else {
            original
        };

        let detections = detector.detect(&image, FrameContext::default(), confidence)?;
        let annotated = annotate_frame(&image, &detections)?;
        debug!("image {}: {} detections", image_id, detections.len());

        let mut logged = 0;
        // 无检测结果时不记录 id
        if is_new && !detections.is_empty() {
            let mut tracker = ClassTracker::new();
            for det in &detections {
                if self.dedup.consider(
                    &det.class_name,
                    det.confidence,
                    timestamp,
                    &annotated,
                    &mut tracker,
                    log,
                ) {
                    logged += 1;
                }
            }
            self.last_image_id = Some(image_id.to_string());
            info!("📸 Image {}: {} detections, {} logged", image_id, detections.len(), logged);
        }

        Ok(ImageInspection {
            detections,
            annotated,
            width,
            height,
            logged,
            is_new,
        })
    }
}
