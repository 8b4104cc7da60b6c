//! YOLOv8 ONNX detector (onnxruntime)

use super::{Detection, Detector, FrameContext, ModelSource};
use crate::core::error::InspectionError;
use crate::core::severity::CLASS_NAMES;
use image::imageops::FilterType;
use image::RgbImage;
use log::{debug, info};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::sync::Mutex;

const INPUT_SIZE: u32 = 640;
const IOU_THRESHOLD: f32 = 0.7;
const MAX_DETECTIONS: usize = 300;
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// COCO class names, used by the baseline model.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

impl From<ort::Error> for InspectionError {
    fn from(e: ort::Error) -> Self {
        InspectionError::Inference(e.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct YoloDetector {
    session: Mutex<Session>,
    class_names: Vec<String>,
    label: String,
}

impl YoloDetector {
    pub fn load(source: &ModelSource) -> Result<Self, InspectionError> {
        info!("🧠 Loading {} from {:?}", source.label(), source.path());

        let num_threads = num_cpus::get().min(4);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(source.path())
            .map_err(|e| InspectionError::ModelLoadFailed(e.to_string()))?;

        let class_names = match source {
            ModelSource::Custom(_) => CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            ModelSource::Baseline(_) => COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        };

        info!("✅ Model loaded ({} classes, {} threads)", class_names.len(), num_threads);
        Ok(Self {
            session: Mutex::new(session),
            class_names,
            label: source.label().to_string(),
        })
    }

    fn preprocess(&self, frame: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (w, h) = frame.dimensions();
        let scale = (INPUT_SIZE as f32 / w.max(1) as f32).min(INPUT_SIZE as f32 / h.max(1) as f32);
        let new_w = ((w as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let new_h = ((h as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

        let pad_x = (INPUT_SIZE - new_w) as f32 / 2.0;
        let pad_y = (INPUT_SIZE - new_h) as f32 / 2.0;
        let off_x = pad_x.floor() as usize;
        let off_y = pad_y.floor() as usize;

        let side = INPUT_SIZE as usize;
        let mut input = Array4::<f32>::from_elem((1, 3, side, side), LETTERBOX_FILL);
        for (x, y, px) in resized.enumerate_pixels() {
            let (tx, ty) = (off_x + x as usize, off_y + y as usize);
            for c in 0..3 {
                input[[0, c, ty, tx]] = px.0[c] as f32 / 255.0;
            }
        }

        (input, Letterbox { scale, pad_x, pad_y })
    }

    /// Decodes `[1, 4 + nc, anchors]` (or transposed) output into boxes in
    /// original frame pixels.
    fn postprocess(
        &self,
        shape: &[i64],
        data: &[f32],
        lb: Letterbox,
        frame_size: (u32, u32),
        conf_threshold: f32,
    ) -> Result<Vec<Detection>, InspectionError> {
        if shape.len() != 3 {
            return Err(InspectionError::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }

        let (d1, d2) = (shape[1] as usize, shape[2] as usize);
        // 特征维度较小的一侧为 4 + nc
        let (features, anchors, transposed) = if d1 < d2 { (d1, d2, false) } else { (d2, d1, true) };
        if features < 5 {
            return Err(InspectionError::Inference(format!(
                "output has {} features, expected at least 5",
                features
            )));
        }
        let at = |feature: usize, anchor: usize| -> f32 {
            if transposed {
                data[anchor * features + feature]
            } else {
                data[feature * anchors + anchor]
            }
        };

        let (fw, fh) = (frame_size.0 as f32, frame_size.1 as f32);
        let mut candidates: Vec<(usize, Detection)> = Vec::new();
        for a in 0..anchors {
            let (best_cls, best_score) = (4..features)
                .map(|f| (f - 4, at(f, a)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

            if !best_score.is_finite() || best_score < conf_threshold {
                continue;
            }

            let (cx, cy, bw, bh) = (at(0, a), at(1, a), at(2, a), at(3, a));
            if bw <= 0.0 || bh <= 0.0 {
                continue;
            }

            let x1 = ((cx - bw / 2.0 - lb.pad_x) / lb.scale).clamp(0.0, fw);
            let y1 = ((cy - bh / 2.0 - lb.pad_y) / lb.scale).clamp(0.0, fh);
            let x2 = ((cx + bw / 2.0 - lb.pad_x) / lb.scale).clamp(0.0, fw);
            let y2 = ((cy + bh / 2.0 - lb.pad_y) / lb.scale).clamp(0.0, fh);
            if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
                continue;
            }

            let class_name = self
                .class_names
                .get(best_cls)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", best_cls));
            candidates.push((best_cls, Detection::new(class_name, best_score, [x1, y1, x2, y2])));
        }

        let before = candidates.len();
        let kept = nms(candidates, IOU_THRESHOLD, MAX_DETECTIONS);
        debug!("NMS: {} candidates -> {} detections", before, kept.len());
        Ok(kept)
    }
}

impl Detector for YoloDetector {
    fn detect(
        &self,
        frame: &RgbImage,
        _ctx: FrameContext,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>, InspectionError> {
        let (input, lb) = self.preprocess(frame);
        let tensor = Tensor::from_array(input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InspectionError::Inference(format!("session lock poisoned: {}", e)))?;
        let outputs = session.run(ort::inputs![tensor])?;

        let output = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .ok_or_else(|| InspectionError::Inference("model has no output0 tensor".into()))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        self.postprocess(&shape, data, lb, frame.dimensions(), conf_threshold)
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Class-aware non-maximum suppression.
fn nms(mut candidates: Vec<(usize, Detection)>, iou_threshold: f32, max_det: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));

    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (cls, det) in candidates {
        let overlaps = kept
            .iter()
            .any(|(k_cls, k)| *k_cls == cls && iou(&k.bbox, &det.bbox) > iou_threshold);
        if !overlaps {
            kept.push((cls, det));
            if kept.len() >= max_det {
                break;
            }
        }
    }
    kept.into_iter().map(|(_, d)| d).collect()
}
