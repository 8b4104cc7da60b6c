//! 巡检会话 - image / video detection into one shared anomaly log

use crate::api::models::{
    AnomalyEventDto, ApiError, DetectionBox, ImageResult, ScanProgressDto, ScanResult,
    SessionSummary, SimulationSettings, VideoPlanInfo,
};
use crate::core::config::{AppConfig, MissionInfo, Turbidity, VideoConfig};
use crate::core::detection::{Detector, ReplayDetector};
use crate::core::error::InspectionError;
use crate::core::inspect::ImageInspector;
use crate::core::report::ReportRenderer;
use crate::core::session::SessionLog;
use crate::core::video::{
    FfmpegSource, FrameSource, MemorySource, ScanControl, ScanPlan, ScanProgress, VideoScanner,
};
use chrono::Local;
use flutter_rust_bridge::frb;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

struct SessionState {
    config: AppConfig,
    log: SessionLog,
    inspector: ImageInspector,
    /// 缓存的 PDF，日志变化时清空
    report: Option<Vec<u8>>,
    rng: StdRng,
}

/// 巡检会话 - 检测 + 去重 + 报告
///
/// ```dart
/// final session = await InspectionSession.create(configPath: "nauticai.json5");
/// final result = await session.detectImage(imageId: file.id, bytes: bytes);
/// final scan = await session.scanVideoFile(path: videoPath);
/// final pdf = await session.report();
/// ```
#[frb(opaque)]
pub struct InspectionSession {
    detector: Box<dyn Detector>,
    model_label: String,
    state: Mutex<SessionState>,
    /// 最近一次扫描的进度，扫描期间也可读取
    progress: Mutex<Option<ScanProgressDto>>,
    stop_requested: AtomicBool,
}

impl InspectionSession {
    /// 加载配置和模型（自定义权重优先，否则下载基线模型）
    #[frb(dart_async)]
    pub async fn create(config_path: Option<String>) -> Result<Self, ApiError> {
        crate::init_logging();
        let config = match config_path {
            Some(path) => AppConfig::load(Path::new(&path))?,
            None => AppConfig::default(),
        };
        let detector = load_model_detector(&config)?;
        Ok(Self::with_detector(detector, config))
    }

    /// Session over detections recorded earlier, no model needed.
    #[frb(sync)]
    pub fn with_recorded_detections(
        detections_json: String,
        config_json5: Option<String>,
    ) -> Result<Self, ApiError> {
        crate::init_logging();
        let config = match config_json5 {
            Some(text) => AppConfig::from_json5(&text)?,
            None => AppConfig::default(),
        };
        let detector = ReplayDetector::from_json(&detections_json)?;
        Ok(Self::with_detector(Box::new(detector), config))
    }

    #[frb(ignore)]
    pub fn with_detector(detector: Box<dyn Detector>, config: AppConfig) -> Self {
        let model_label = detector.label();
        info!("🌊 InspectionSession: created ({})", model_label);
        Self {
            detector,
            model_label,
            state: Mutex::new(SessionState {
                config,
                log: SessionLog::new(),
                inspector: ImageInspector::new(),
                report: None,
                rng: StdRng::from_entropy(),
            }),
            progress: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::new("Internal", format!("session lock poisoned: {}", e)))
    }

    #[frb(sync, getter)]
    pub fn model_label(&self) -> String {
        self.model_label.clone()
    }

    #[frb(sync, getter)]
    pub fn class_names(&self) -> Vec<String> {
        self.detector.class_names()
    }

    /// 置信度阈值，限制在 [0.10, 1.0]
    #[frb(sync)]
    pub fn set_confidence(&self, confidence: f32) -> Result<f32, ApiError> {
        let mut state = self.lock()?;
        state.config.set_confidence(confidence);
        Ok(state.config.confidence)
    }

    #[frb(sync)]
    pub fn set_simulation(&self, settings: SimulationSettings) -> Result<(), ApiError> {
        let turbidity: Turbidity = settings.turbidity.parse()?;
        let mut state = self.lock()?;
        state.config.simulation.enabled = settings.enabled;
        state.config.simulation.turbidity = turbidity;
        state.config.simulation.marine_snow = settings.marine_snow;
        Ok(())
    }

    #[frb(sync)]
    pub fn set_mission(&self, mission: MissionInfo) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.config.mission = mission;
        state.report = None;
        Ok(())
    }

    #[frb(sync, getter)]
    pub fn mission(&self) -> Result<MissionInfo, ApiError> {
        Ok(self.lock()?.config.mission.clone())
    }

    /// 单张图片检测；同一 image_id 再次提交不会重复记录
    #[frb]
    pub fn detect_image(&self, image_id: String, bytes: Vec<u8>) -> Result<ImageResult, ApiError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let confidence = state.config.confidence;
        let simulation = state.config.simulation.clone();

        let result = state.inspector.inspect(
            self.detector.as_ref(),
            &image_id,
            &bytes,
            confidence,
            &simulation,
            &mut state.log,
            &mut state.rng,
        )?;
        if result.logged > 0 {
            state.report = None;
        }

        Ok(ImageResult {
            detections: result.detections.iter().map(DetectionBox::from).collect(),
            annotated_jpeg: result.annotated.to_vec(),
            width: result.width,
            height: result.height,
            logged: result.logged as u32,
            is_new: result.is_new,
        })
    }

    /// 视频信息与推荐参数（约每秒 2 帧，覆盖整段视频）
    #[frb]
    pub fn plan_video(&self, path: String) -> Result<VideoPlanInfo, ApiError> {
        let source = FfmpegSource::open(Path::new(&path))?;
        let probe = source.probe();
        Ok(VideoPlanInfo::new(&probe, ScanPlan::recommended(&probe)))
    }

    #[frb]
    pub fn scan_video_file(
        &self,
        path: String,
        skip: Option<u32>,
        max_frames: Option<u32>,
    ) -> Result<ScanResult, ApiError> {
        let mut source = FfmpegSource::open(Path::new(&path))?;
        self.run_scan(&mut source, skip, max_frames)
    }

    /// Frames decoded by the host (JPEG / PNG), in stream order.
    #[frb]
    pub fn process_video_batch(
        &self,
        frames: Vec<Vec<u8>>,
        fps: f64,
        skip: Option<u32>,
        max_frames: Option<u32>,
    ) -> Result<ScanResult, ApiError> {
        let mut source = MemorySource::from_encoded(&frames, fps)?;
        self.run_scan(&mut source, skip, max_frames)
    }

    /// Ends a running scan after the current frame.
    #[frb(sync)]
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// 当前（或最近一次）扫描进度，不等待扫描结束
    #[frb(sync, getter)]
    pub fn scan_progress(&self) -> Option<ScanProgressDto> {
        self.progress.lock().ok().and_then(|p| p.clone())
    }

    fn publish_progress(&self, progress: Option<ScanProgressDto>) {
        if let Ok(mut slot) = self.progress.lock() {
            *slot = progress;
        }
    }

    fn finish_progress(&self) {
        if let Ok(mut slot) = self.progress.lock() {
            if let Some(p) = slot.as_mut() {
                p.running = false;
            }
        }
    }

    fn run_scan(
        &self,
        source: &mut dyn FrameSource,
        skip: Option<u32>,
        max_frames: Option<u32>,
    ) -> Result<ScanResult, ApiError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        // 拿到锁后再清除停止标记，避免吞掉正在运行的扫描的停止请求
        self.stop_requested.store(false, Ordering::SeqCst);
        self.publish_progress(None);

        let overrides = VideoConfig {
            skip: skip.or(state.config.video.skip),
            max_frames: max_frames.or(state.config.video.max_frames),
        };
        let plan = ScanPlan::recommended(&source.probe()).with_overrides(&overrides);
        let scanner = VideoScanner::new(
            self.detector.as_ref(),
            state.config.confidence,
            state.config.simulation.clone(),
        );

        let mut observer = |p: &ScanProgress| {
            self.publish_progress(Some(ScanProgressDto::from(p)));
            if self.stop_requested.load(Ordering::SeqCst) {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            }
        };
        let scanned = scanner.scan(source, plan, &mut state.log, Some(&mut observer));
        self.finish_progress();
        // 扫描结束后报告需重新生成（出错时已记录的事件同样保留）
        state.report = None;
        let report = scanned?;

        Ok(ScanResult::new(report, &state.log))
    }

    #[frb(sync)]
    pub fn anomaly_log(&self) -> Result<Vec<AnomalyEventDto>, ApiError> {
        Ok(self.lock()?.log.events().iter().map(AnomalyEventDto::from).collect())
    }

    #[frb(sync)]
    pub fn summary(&self) -> Result<SessionSummary, ApiError> {
        Ok(SessionSummary::from(&self.lock()?.log))
    }

    #[frb(sync)]
    pub fn export_log_json(&self) -> Result<String, ApiError> {
        Ok(self.lock()?.log.to_json().map_err(InspectionError::from)?)
    }

    /// PDF 报告（缓存，日志变化后重新生成）
    #[frb]
    pub fn report(&self) -> Result<Vec<u8>, ApiError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if let Some(pdf) = &state.report {
            return Ok(pdf.clone());
        }

        let renderer = ReportRenderer::new(state.config.mission.clone(), self.model_label.clone());
        let pdf = renderer.render_log(&state.log, Local::now().naive_local())?;
        state.report = Some(pdf.clone());
        Ok(pdf)
    }

    /// 清空日志、已处理图片记录和报告缓存
    #[frb(sync)]
    pub fn reset(&self) -> Result<(), ApiError> {
        let mut state = self.lock()?;
        state.log.clear();
        state.inspector.reset();
        state.report = None;
        self.publish_progress(None);
        info!("🧹 InspectionSession: reset");
        Ok(())
    }
}

impl Drop for InspectionSession {
    fn drop(&mut self) {
        info!("🗑️ InspectionSession: released");
    }
}

#[cfg(feature = "onnx")]
fn load_model_detector(config: &AppConfig) -> Result<Box<dyn Detector>, ApiError> {
    use crate::core::detection::{ModelManager, YoloDetector};

    let source = ModelManager::new(&config.model).resolve()?;
    Ok(Box::new(YoloDetector::load(&source)?))
}

#[cfg(not(feature = "onnx"))]
fn load_model_detector(_config: &AppConfig) -> Result<Box<dyn Detector>, ApiError> {
    log::warn!("⚠️ Built without the onnx feature, no model detector available");
    Err(InspectionError::ModelLoadFailed(
        "built without the `onnx` feature; use recorded detections instead".to_string(),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotate::encode_jpeg;
    use crate::core::detection::{Detection, MockDetector};
    use image::{Rgb, RgbImage};

    fn jpeg() -> Vec<u8> {
        encode_jpeg(&RgbImage::from_pixel(24, 16, Rgb([30, 80, 100])), 90).unwrap()
    }

    fn session() -> InspectionSession {
        let detector = MockDetector::constant(vec![
            Detection::new("free_span", 0.72, [1.0, 1.0, 10.0, 10.0]),
            Detection::new("debris", 0.40, [2.0, 2.0, 8.0, 8.0]),
        ]);
        InspectionSession::with_detector(Box::new(detector), AppConfig::default())
    }

    #[test]
    fn test_image_then_resubmit() {
        let session = session();
        let first = session.detect_image("a".into(), jpeg()).unwrap();
        let second = session.detect_image("a".into(), jpeg()).unwrap();

        assert_eq!(first.logged, 2);
        assert_eq!(second.logged, 0);
        assert_eq!(second.detections[0].display_name, "Free Span");

        let summary = session.summary().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.outcome, "CRITICAL");
    }

    #[test]
    fn test_report_cache_invalidated() {
        let session = session();
        let empty = session.report().unwrap();
        assert_eq!(session.report().unwrap(), empty);

        session.detect_image("a".into(), jpeg()).unwrap();
        let with_events = session.report().unwrap();
        assert_ne!(with_events, empty);
        assert!(with_events.starts_with(b"%PDF"));
    }

    #[test]
    fn test_video_batch_and_reset() {
        let session = session();
        let frames = vec![jpeg(); 12];
        let result = session.process_video_batch(frames, 4.0, Some(2), None).unwrap();

        assert_eq!(result.frames_read, 12);
        assert_eq!(result.frames_processed, 6);
        assert_eq!(result.events_added, 2);
        assert_eq!(session.anomaly_log().unwrap()[0].timestamp, "00:00");

        session.reset().unwrap();
        assert_eq!(session.summary().unwrap().total, 0);
        assert_eq!(session.summary().unwrap().outcome, "HEALTHY");
        // 重置后同一图片可再次记录
        assert_eq!(session.detect_image("a".into(), jpeg()).unwrap().logged, 2);
    }

    #[test]
    fn test_scan_progress_readable() {
        let session = session();
        assert!(session.scan_progress().is_none());

        session.process_video_batch(vec![jpeg(); 12], 4.0, Some(2), None).unwrap();
        let progress = session.scan_progress().unwrap();
        assert!(!progress.running);
        assert_eq!((progress.processed, progress.max_frames), (6, 10));
        assert_eq!(progress.total_logged, 2);
        assert_eq!(progress.frame_number, 12);
        assert_eq!(progress.clock, "00:03");
        assert_eq!(progress.class_counts.len(), 2);

        // 进度单独加锁，会话状态被占用时仍可读取
        let _busy = session.lock().unwrap();
        assert_eq!(session.scan_progress().unwrap().processed, 6);
    }

    #[test]
    fn test_stop_request_before_scan_is_cleared() {
        let session = session();
        session.request_stop();
        let result = session.process_video_batch(vec![jpeg(); 12], 4.0, Some(1), None).unwrap();
        assert!(!result.stopped);
        assert_eq!(result.frames_processed, 10);
    }

    #[test]
    fn test_settings() {
        let session = session();
        assert_eq!(session.set_confidence(0.05).unwrap(), 0.10);

        let bad = session.set_simulation(SimulationSettings {
            enabled: true,
            turbidity: "murky".into(),
            marine_snow: false,
        });
        assert!(bad.is_err());

        let mission = MissionInfo {
            name: "Jetty survey".into(),
            ..Default::default()
        };
        session.set_mission(mission).unwrap();
        assert_eq!(session.mission().unwrap().name, "Jetty survey");
    }

    #[test]
    fn test_recorded_detections_session() {
        let json = r#"{ "frames": { "0": [ { "class_name": "anode", "confidence": 0.9, "bbox": [0, 0, 4, 4] } ] } }"#;
        let session = InspectionSession::with_recorded_detections(json.into(), None).unwrap();
        assert_eq!(session.model_label(), "Recorded Detections");

        let result = session.detect_image("x".into(), jpeg()).unwrap();
        assert_eq!(result.logged, 1);
        assert_eq!(session.summary().unwrap().outcome, "WARNING");
    }
}
