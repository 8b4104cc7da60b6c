//! 视频扫描 - skip / budget planning and the per-scan detection loop

use super::frame::{FrameInfo, VideoFrame};
use super::source::{FrameSource, VideoProbe};
use crate::core::annotate::annotate_frame;
use crate::core::config::{SimulationConfig, VideoConfig};
use crate::core::dedup::{ClassTracker, EventDeduplicator};
use crate::core::detection::{Detection, Detector, FrameContext};
use crate::core::error::InspectionError;
use crate::core::session::{FrameRef, SessionLog};
use crate::core::simulate::full_simulation;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

pub const MIN_SKIP: u32 = 1;
pub const MAX_SKIP: u32 = 30;
pub const MIN_MAX_FRAMES: u32 = 10;
pub const MAX_MAX_FRAMES: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    /// process every N-th frame
    pub skip: u32,
    /// stop after this many processed frames
    pub max_frames: u32,
}

impl ScanPlan {
    /// About two checks per second, enough budget to cover the whole video.
    pub fn recommended(probe: &VideoProbe) -> Self {
        let skip = ((probe.fps / 2.0).floor() as u32).max(1);
        let max_frames = ((probe.duration * 2.0).floor() as u32).min(MAX_MAX_FRAMES);
        Self::new(skip, max_frames)
    }

    pub fn new(skip: u32, max_frames: u32) -> Self {
        Self {
            skip: skip.clamp(MIN_SKIP, MAX_SKIP),
            max_frames: max_frames.clamp(MIN_MAX_FRAMES, MAX_MAX_FRAMES),
        }
    }

    pub fn with_overrides(self, video: &VideoConfig) -> Self {
        Self::new(
            video.skip.unwrap_or(self.skip),
            video.max_frames.unwrap_or(self.max_frames),
        )
    }

    pub fn should_process(&self, frame_number: u64) -> bool {
        frame_number % self.skip as u64 == 0
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub processed: u32,
    pub max_frames: u32,
    /// events in the whole session log
    pub total_logged: usize,
    pub clock: String,
    pub frame: FrameInfo,
    /// instances logged per class during this scan
    pub class_counts: Vec<(String, usize)>,
}

impl ScanProgress {
    pub fn fraction(&self) -> f32 {
        (self.processed as f32 / self.max_frames.max(1) as f32).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

pub trait ScanObserver {
    fn on_progress(&mut self, progress: &ScanProgress) -> ScanControl;
}

impl<F> ScanObserver for F
where
    F: FnMut(&ScanProgress) -> ScanControl,
{
    fn on_progress(&mut self, progress: &ScanProgress) -> ScanControl {
        self(progress)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub frames_read: u64,
    pub frames_processed: u32,
    pub events_added: usize,
    pub class_counts: Vec<(String, usize)>,
    pub stopped: bool,
}

/// 已完成检测、待去重的帧
struct PreparedFrame {
    info: FrameInfo,
    clock: String,
    detections: Vec<Detection>,
    annotated: Option<FrameRef>,
}

pub struct VideoScanner<'a> {
    detector: &'a dyn Detector,
    dedup: EventDeduplicator,
    confidence: f32,
    simulation: SimulationConfig,
    seed: u64,
    batch_size: usize,
}

impl<'a> VideoScanner<'a> {
    pub fn new(detector: &'a dyn Detector, confidence: f32, simulation: SimulationConfig) -> Self {
        Self {
            detector,
            dedup: EventDeduplicator::new(),
            confidence,
            simulation,
            seed: rand::random(),
            batch_size: num_cpus::get().max(1),
        }
    }

    /// Fixes the simulation noise, for reproducible scans.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs one scan with its own class tracker, appending events to `log`.
    pub fn scan(
        &self,
        source: &mut dyn FrameSource,
        plan: ScanPlan,
        log: &mut SessionLog,
        mut observer: Option<&mut dyn ScanObserver>,
    ) -> Result<ScanReport, InspectionError> {
        info!(
            "🚀 Scan started: every {} frames, up to {} frames ({})",
            plan.skip,
            plan.max_frames,
            self.detector.label()
        );

        let mut tracker = ClassTracker::new();
        let mut report = ScanReport::default();
        let log_start = log.len();
        let mut exhausted = false;

        'scan: while !exhausted && report.frames_processed < plan.max_frames {
            let budget = (plan.max_frames - report.frames_processed) as usize;
            let mut batch: Vec<VideoFrame> = Vec::with_capacity(self.batch_size.min(budget));

            while batch.len() < self.batch_size.min(budget) {
                match source.next_frame()? {
                    Some(frame) => {
                        report.frames_read += 1;
                        if plan.should_process(frame.frame_number) {
                            batch.push(frame);
                        }
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            // 并行：模拟 + 检测 + 标注
            let prepared: Vec<Result<PreparedFrame, InspectionError>> = batch
                .into_par_iter()
                .map(|frame| self.prepare(frame))
                .collect();

            // 串行去重，保持时间顺序；出错帧之前的帧照常记录
            for frame in prepared {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(
                            "❌ Scan aborted after {} processed frames: {}",
                            report.frames_processed, e
                        );
                        return Err(e);
                    }
                };
                if let Some(annotated) = &frame.annotated {
                    for det in &frame.detections {
                        self.dedup.consider(
                            &det.class_name,
                            det.confidence,
                            &frame.clock,
                            annotated,
                            &mut tracker,
                            log,
                        );
                    }
                }
                report.frames_processed += 1;

                if let Some(obs) = observer.as_deref_mut() {
                    let progress = ScanProgress {
                        processed: report.frames_processed,
                        max_frames: plan.max_frames,
                        total_logged: log.len(),
                        clock: frame.clock.clone(),
                        frame: frame.info,
                        class_counts: tracker.counts(),
                    };
                    if obs.on_progress(&progress) == ScanControl::Stop {
                        info!("⏹️ Scan stopped at {}", frame.clock);
                        report.stopped = true;
                        break 'scan;
                    }
                }
            }
        }

        report.events_added = log.len() - log_start;
        report.class_counts = tracker.counts();
        info!(
            "✅ Scan finished: {} read, {} processed, {} new events",
            report.frames_read, report.frames_processed, report.events_added
        );
        Ok(report)
    }

    fn prepare(&self, frame: VideoFrame) -> Result<PreparedFrame, InspectionError> {
        let info = FrameInfo::from_frame(&frame);
        let clock = frame.clock();

        let image = if self.simulation.enabled {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(frame.frame_number));
            full_simulation(&frame.image, &self.simulation, &mut rng)
        } else {
            frame.image
        };

        let detections = self.detector.detect(
            &image,
            FrameContext {
                frame_number: frame.frame_number,
            },
            self.confidence,
        )?;
        debug!("frame {} ({}): {} detections", info.frame_number, clock, detections.len());

        let annotated = if detections.is_empty() {
            None
        } else {
            Some(annotate_frame(&image, &detections)?)
        };

        Ok(PreparedFrame {
            info,
            clock,
            detections,
            annotated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::MockDetector;
    use crate::core::video::source::MemorySource;
    use image::RgbImage;
    use std::sync::{Arc, Mutex};

    fn source(frames: usize, fps: f64) -> MemorySource {
        MemorySource::new(vec![RgbImage::new(8, 8); frames], fps)
    }

    fn debris(confidence: f32) -> Vec<Detection> {
        vec![Detection::new("debris", confidence, [1.0, 1.0, 6.0, 6.0])]
    }

    #[test]
    fn test_recommended_plan() {
        let plan = ScanPlan::recommended(&VideoProbe::new(900, 30.0, 640, 480));
        assert_eq!(plan, ScanPlan { skip: 15, max_frames: 60 });

        let plan = ScanPlan::recommended(&VideoProbe::new(3, 1.0, 640, 480));
        assert_eq!(plan, ScanPlan { skip: 1, max_frames: 10 });

        let plan = ScanPlan::recommended(&VideoProbe::new(120 * 3600, 120.0, 640, 480));
        assert_eq!(plan, ScanPlan { skip: 30, max_frames: 300 });
    }

    #[test]
    fn test_plan_overrides_clamped() {
        let base = ScanPlan::new(15, 60);
        let plan = base.with_overrides(&VideoConfig {
            skip: Some(0),
            max_frames: Some(1000),
        });
        assert_eq!(plan, ScanPlan { skip: 1, max_frames: 300 });
        assert_eq!(base.with_overrides(&VideoConfig::default()), base);
    }

    #[test]
    fn test_skip_and_budget() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        let detector = MockDetector::with_pattern(move |n| {
            seen_in.lock().unwrap().push(n);
            Vec::new()
        });
        let scanner = VideoScanner::new(&detector, 0.25, SimulationConfig::default()).with_batch_size(4);
        let mut log = SessionLog::new();

        let report = scanner
            .scan(&mut source(100, 10.0), ScanPlan::new(3, 10), &mut log, None)
            .unwrap();

        assert_eq!(report.frames_processed, 10);
        assert_eq!(report.frames_read, 30);
        let mut frames = seen.lock().unwrap().clone();
        frames.sort_unstable();
        assert_eq!(frames, (1..=10).map(|i| i * 3).collect::<Vec<u64>>());
    }

    #[test]
    fn test_short_video_ends_early() {
        let detector = MockDetector::new();
        let scanner = VideoScanner::new(&detector, 0.25, SimulationConfig::default());
        let mut log = SessionLog::new();

        let report = scanner
            .scan(&mut source(7, 10.0), ScanPlan::new(2, 300), &mut log, None)
            .unwrap();
        assert_eq!(report.frames_read, 7);
        assert_eq!(report.frames_processed, 3);
        assert!(!report.stopped);
    }

    #[test]
    fn test_scan_dedups_in_frame_order() {
        // 每 5 帧出现一次 debris，置信度逐渐变化
        let detector = MockDetector::with_pattern(|n| match n {
            5 => debris(0.40),
            10 => debris(0.55),
            15 => debris(0.90),
            _ => Vec::new(),
        });
        let scanner = VideoScanner::new(&detector, 0.25, SimulationConfig::default()).with_batch_size(3);
        let mut log = SessionLog::new();

        let report = scanner
            .scan(&mut source(20, 5.0), ScanPlan::new(5, 10), &mut log, None)
            .unwrap();

        let logged: Vec<(f32, &str)> = log
            .events()
            .iter()
            .map(|e| (e.confidence, e.timestamp.as_str()))
            .collect();
        assert_eq!(logged, vec![(0.40, "00:01"), (0.90, "00:03")]);
        assert_eq!(report.events_added, 2);
        assert_eq!(report.class_counts, vec![("debris".to_string(), 2)]);
    }

    #[test]
    fn test_each_scan_has_fresh_tracker() {
        let detector = MockDetector::constant(debris(0.6));
        let scanner = VideoScanner::new(&detector, 0.25, SimulationConfig::default());
        let mut log = SessionLog::new();

        scanner.scan(&mut source(10, 5.0), ScanPlan::new(1, 10), &mut log, None).unwrap();
        scanner.scan(&mut source(10, 5.0), ScanPlan::new(1, 10), &mut log, None).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_observer_progress_and_stop() {
        let detector = MockDetector::constant(debris(0.6));
        let scanner = VideoScanner::new(&detector, 0.25, SimulationConfig::default()).with_batch_size(8);
        let mut log = SessionLog::new();

        let mut updates: Vec<(u32, usize)> = Vec::new();
        let mut observer = |p: &ScanProgress| {
            updates.push((p.processed, p.total_logged));
            if p.processed == 3 {
                ScanControl::Stop
            } else {
                ScanControl::Continue
            }
        };

        let report = scanner
            .scan(&mut source(50, 10.0), ScanPlan::new(1, 20), &mut log, Some(&mut observer))
            .unwrap();

        assert!(report.stopped);
        assert_eq!(report.frames_processed, 3);
        assert_eq!(updates, vec![(1, 1), (2, 1), (3, 1)]);
    }

    /// debris on frame 1, detector failure on frame 3
    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(
            &self,
            _frame: &RgbImage,
            ctx: FrameContext,
            _conf_threshold: f32,
        ) -> Result<Vec<Detection>, InspectionError> {
            match ctx.frame_number {
                1 => Ok(debris(0.4)),
                3 => Err(InspectionError::Inference("frame 3 failed".into())),
                _ => Ok(Vec::new()),
            }
        }

        fn class_names(&self) -> Vec<String> {
            vec!["debris".to_string()]
        }

        fn label(&self) -> String {
            "Failing".to_string()
        }
    }

    #[test]
    fn test_error_keeps_events_before_failing_frame() {
        for batch_size in [1, 2, 4, 16] {
            let scanner =
                VideoScanner::new(&FailingDetector, 0.25, SimulationConfig::default()).with_batch_size(batch_size);
            let mut log = SessionLog::new();
            let mut processed = 0;
            let mut observer = |p: &ScanProgress| {
                processed = p.processed;
                ScanControl::Continue
            };

            let result = scanner.scan(&mut source(10, 5.0), ScanPlan::new(1, 10), &mut log, Some(&mut observer));

            assert!(matches!(result, Err(InspectionError::Inference(_))), "batch {}", batch_size);
            assert_eq!(log.len(), 1, "batch {}", batch_size);
            assert_eq!(processed, 2, "batch {}", batch_size);
        }
    }

    #[test]
    fn test_simulation_applied_when_enabled() {
        let detector = MockDetector::new();
        let simulation = SimulationConfig {
            enabled: true,
            ..Default::default()
        };
        let scanner = VideoScanner::new(&detector, 0.25, simulation).with_seed(9);
        let mut log = SessionLog::new();

        let report = scanner
            .scan(&mut source(4, 2.0), ScanPlan::new(1, 10), &mut log, None)
            .unwrap();
        assert_eq!(report.frames_processed, 4);
        assert!(log.is_empty());
    }
}
