use crate::core::detection::Detection;
use crate::core::session::{AnomalyEvent, ScanOutcome, SessionLog};
use crate::core::video::{ScanPlan, ScanProgress, ScanReport, VideoProbe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionBox {
    pub class_name: String,
    pub display_name: String,
    pub severity: String,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<&Detection> for DetectionBox {
    fn from(d: &Detection) -> Self {
        Self {
            class_name: d.class_name.clone(),
            display_name: crate::core::severity::display_name(&d.class_name),
            severity: crate::core::severity::Severity::of(&d.class_name).label().to_string(),
            confidence: d.confidence,
            x1: d.bbox[0],
            y1: d.bbox[1],
            x2: d.bbox[2],
            y2: d.bbox[3],
        }
    }
}

/// 图片检测结果
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub detections: Vec<DetectionBox>,
    /// Annotated frame (JPEG)
    pub annotated_jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub logged: u32,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEventDto {
    pub class_name: String,
    pub confidence: f32,
    pub timestamp: String,
    pub severity: String,
    #[serde(skip)]
    pub frame_jpeg: Vec<u8>,
}

impl From<&AnomalyEvent> for AnomalyEventDto {
    fn from(e: &AnomalyEvent) -> Self {
        Self {
            class_name: e.class_name.clone(),
            confidence: e.confidence,
            timestamp: e.timestamp.clone(),
            severity: e.severity().label().to_string(),
            frame_jpeg: e.frame.to_vec(),
        }
    }
}

impl From<AnomalyEventDto> for AnomalyEvent {
    fn from(e: AnomalyEventDto) -> Self {
        Self {
            class_name: e.class_name,
            confidence: e.confidence,
            timestamp: e.timestamp,
            frame: Arc::from(e.frame_jpeg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub class_name: String,
    pub count: u32,
}

fn class_counts(counts: Vec<(String, usize)>) -> Vec<ClassCount> {
    counts
        .into_iter()
        .map(|(class_name, count)| ClassCount {
            class_name,
            count: count as u32,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: u32,
    pub critical: u32,
    pub warning: u32,
    pub normal: u32,
    /// HEALTHY / CRITICAL / WARNING
    pub outcome: String,
    pub message: String,
    pub class_counts: Vec<ClassCount>,
}

impl From<&SessionLog> for SessionSummary {
    fn from(log: &SessionLog) -> Self {
        let s = log.summary();
        let outcome = match log.outcome() {
            ScanOutcome::Healthy => "HEALTHY",
            ScanOutcome::Critical => "CRITICAL",
            ScanOutcome::Warning => "WARNING",
        };
        Self {
            total: s.total as u32,
            critical: s.critical as u32,
            warning: s.warning as u32,
            normal: s.normal as u32,
            outcome: outcome.to_string(),
            message: log.outcome_message(),
            class_counts: class_counts(log.class_counts()),
        }
    }
}

/// 视频信息 + 推荐扫描参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPlanInfo {
    pub frame_count: u64,
    pub fps: f64,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub recommended_skip: u32,
    pub recommended_max_frames: u32,
}

impl VideoPlanInfo {
    pub fn new(probe: &VideoProbe, plan: ScanPlan) -> Self {
        Self {
            frame_count: probe.frame_count,
            fps: probe.fps,
            duration_secs: probe.duration,
            width: probe.width,
            height: probe.height,
            recommended_skip: plan.skip,
            recommended_max_frames: plan.max_frames,
        }
    }
}

/// 扫描进度：SCANNING n/max | DETECTIONS LOGGED | TIME
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgressDto {
    pub processed: u32,
    pub max_frames: u32,
    pub total_logged: u32,
    pub clock: String,
    pub frame_number: u64,
    /// 0.0 - 1.0
    pub fraction: f32,
    /// per-class badges for the running scan
    pub class_counts: Vec<ClassCount>,
    pub running: bool,
}

impl From<&ScanProgress> for ScanProgressDto {
    fn from(p: &ScanProgress) -> Self {
        Self {
            processed: p.processed,
            max_frames: p.max_frames,
            total_logged: p.total_logged as u32,
            clock: p.clock.clone(),
            frame_number: p.frame.frame_number,
            fraction: p.fraction(),
            class_counts: class_counts(p.class_counts.clone()),
            running: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub frames_read: u64,
    pub frames_processed: u32,
    pub events_added: u32,
    pub stopped: bool,
    /// instances per class found in this scan
    pub class_counts: Vec<ClassCount>,
    pub summary: SessionSummary,
}

impl ScanResult {
    pub fn new(report: ScanReport, log: &SessionLog) -> Self {
        Self {
            frames_read: report.frames_read,
            frames_processed: report.frames_processed,
            events_added: report.events_added as u32,
            stopped: report.stopped,
            class_counts: class_counts(report.class_counts),
            summary: SessionSummary::from(log),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub enabled: bool,
    /// low / medium / high
    pub turbidity: String,
    pub marine_snow: bool,
}
