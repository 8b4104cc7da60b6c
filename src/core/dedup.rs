use super::session::{AnomalyEvent, FrameRef, SessionLog};
use log::debug;
use std::collections::HashMap;

/// Same class seen again with a confidence at least this far from every
/// logged confidence counts as a different instance.
pub const DIFF_THRESHOLD: f32 = 0.30;

/// Absorbs binary float error so decimal boundaries (0.50 → 0.80) hold.
const GAP_TOLERANCE: f32 = 1e-6;

/// 每次检测运行的类别记录：class → confidences already logged, in order
#[derive(Debug, Clone, Default)]
pub struct ClassTracker {
    seen: HashMap<String, Vec<f32>>,
    order: Vec<String>,
}

impl ClassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confidences(&self, class_name: &str) -> Option<&[f32]> {
        self.seen.get(class_name).map(|v| v.as_slice())
    }

    /// Instances logged for a class in this run.
    pub fn instances(&self, class_name: &str) -> usize {
        self.seen.get(class_name).map_or(0, |v| v.len())
    }

    /// (class, instances) in first-seen order
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.order
            .iter()
            .map(|name| (name.clone(), self.instances(name)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    fn record(&mut self, class_name: &str, confidence: f32) {
        match self.seen.get_mut(class_name) {
            Some(confs) => confs.push(confidence),
            None => {
                self.seen.insert(class_name.to_string(), vec![confidence]);
                self.order.push(class_name.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupReason {
    NewClass,         // 首次出现，记录
    DistinctInstance, // 置信度差异足够大，记录
    SameInstance,     // 同一目标重复出现，跳过
}

#[derive(Debug, Clone, Copy)]
pub struct DedupDecision {
    pub is_duplicate: bool,
    pub reason: DedupReason,
    /// Smallest gap to an already logged confidence; `None` for a new class.
    pub nearest_gap: Option<f32>,
}

/// Decides which raw detections become anomaly events.
#[derive(Debug, Clone, Copy)]
pub struct EventDeduplicator {
    threshold: f32,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self {
            threshold: DIFF_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Pure decision, nothing is recorded.
    pub fn decide(&self, class_name: &str, confidence: f32, tracker: &ClassTracker) -> DedupDecision {
        let Some(logged) = tracker.confidences(class_name) else {
            return DedupDecision {
                is_duplicate: false,
                reason: DedupReason::NewClass,
                nearest_gap: None,
            };
        };

        let nearest = logged
            .iter()
            .map(|prev| (confidence - prev).abs())
            .fold(f32::INFINITY, f32::min);

        if nearest + GAP_TOLERANCE >= self.threshold {
            DedupDecision {
                is_duplicate: false,
                reason: DedupReason::DistinctInstance,
                nearest_gap: Some(nearest),
            }
        } else {
            DedupDecision {
                is_duplicate: true,
                reason: DedupReason::SameInstance,
                nearest_gap: Some(nearest),
            }
        }
    }

    /// Logs the detection as an event unless it repeats an already logged
    /// instance. Returns whether an event was appended.
    pub fn consider(
        &self,
        class_name: &str,
        confidence: f32,
        timestamp: &str,
        frame: &FrameRef,
        tracker: &mut ClassTracker,
        log: &mut SessionLog,
    ) -> bool {
        let decision = self.decide(class_name, confidence, tracker);
        if decision.is_duplicate {
            debug!(
                "⏭️ skip {} {:.2} (gap {:.2})",
                class_name,
                confidence,
                decision.nearest_gap.unwrap_or_default()
            );
            return false;
        }

        log.push(AnomalyEvent {
            class_name: class_name.to_string(),
            confidence,
            timestamp: timestamp.to_string(),
            frame: FrameRef::clone(frame),
        });
        tracker.record(class_name, confidence);
        debug!("📝 logged {} {:.2} at {} ({:?})", class_name, confidence, timestamp, decision.reason);
        true
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame() -> FrameRef {
        Arc::from(vec![0xFFu8, 0xD8])
    }

    fn submit(
        dedup: &EventDeduplicator,
        tracker: &mut ClassTracker,
        log: &mut SessionLog,
        class_name: &str,
        confidence: f32,
    ) -> bool {
        dedup.consider(class_name, confidence, "00:00", &frame(), tracker, log)
    }

    #[test]
    fn test_new_class_always_logged() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        for (i, class_name) in ["corrosion", "debris", "anode"].iter().enumerate() {
            assert!(submit(&dedup, &mut tracker, &mut log, class_name, 0.1 * i as f32 + 0.3));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_close_confidences_only_first_logged() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        let confs = [0.50, 0.55, 0.61, 0.45, 0.70, 0.32];
        let logged: Vec<bool> = confs
            .iter()
            .map(|&c| submit(&dedup, &mut tracker, &mut log, "corrosion", c))
            .collect();

        assert_eq!(logged, vec![true, false, false, false, false, false]);
        assert_eq!(tracker.confidences("corrosion"), Some(&[0.50][..]));
    }

    #[test]
    fn test_exact_resubmission_is_skipped() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "damage", 0.62));
        assert!(!submit(&dedup, &mut tracker, &mut log, "damage", 0.62));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_boundary_gap_is_distinct() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.50));
        let decision = dedup.decide("debris", 0.80, &tracker);
        assert_eq!(decision.reason, DedupReason::DistinctInstance);
        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.80));
    }

    #[test]
    fn test_decimal_boundaries_within_float_error() {
        let dedup = EventDeduplicator::new();

        for (first, second) in [(0.60, 0.90), (0.40, 0.70), (0.90, 0.60)] {
            let mut tracker = ClassTracker::new();
            let mut log = SessionLog::new();
            assert!(submit(&dedup, &mut tracker, &mut log, "corrosion", first));

            // f32 的差值略小于 0.30
            let decision = dedup.decide("corrosion", second, &tracker);
            assert!(decision.nearest_gap.is_some_and(|g| g < DIFF_THRESHOLD), "{} -> {}", first, second);
            assert_eq!(decision.reason, DedupReason::DistinctInstance, "{} -> {}", first, second);
            assert!(submit(&dedup, &mut tracker, &mut log, "corrosion", second));
            assert_eq!(log.len(), 2);
        }
    }

    #[test]
    fn test_gap_just_under_threshold_skipped() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.50));
        assert!(!submit(&dedup, &mut tracker, &mut log, "debris", 0.7999));
        assert!(!submit(&dedup, &mut tracker, &mut log, "debris", 0.2001));
        assert_eq!(dedup.decide("debris", 0.7999, &tracker).reason, DedupReason::SameInstance);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_gap_below_threshold_skipped() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.50));
        assert!(!submit(&dedup, &mut tracker, &mut log, "debris", 0.79));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_debris_scenario() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.40));
        assert!(!submit(&dedup, &mut tracker, &mut log, "debris", 0.55));
        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.90));

        assert_eq!(tracker.confidences("debris"), Some(&[0.40, 0.90][..]));
        let logged: Vec<f32> = log.events().iter().map(|e| e.confidence).collect();
        assert_eq!(logged, vec![0.40, 0.90]);
    }

    #[test]
    fn test_gap_must_hold_against_every_logged_value() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "corrosion", 0.20));
        assert!(submit(&dedup, &mut tracker, &mut log, "corrosion", 0.90));
        // 0.41 from the first, only 0.29 from the second
        assert!(!submit(&dedup, &mut tracker, &mut log, "corrosion", 0.61));
        assert_eq!(dedup.decide("corrosion", 0.61, &tracker).nearest_gap.map(|g| g < 0.30), Some(true));
    }

    #[test]
    fn test_classes_are_independent() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        assert!(submit(&dedup, &mut tracker, &mut log, "debris", 0.50));
        assert!(submit(&dedup, &mut tracker, &mut log, "anode", 0.50));
        assert!(!submit(&dedup, &mut tracker, &mut log, "debris", 0.52));
        assert_eq!(tracker.counts(), vec![("debris".to_string(), 1), ("anode".to_string(), 1)]);
    }

    #[test]
    fn test_skip_leaves_log_untouched() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();

        submit(&dedup, &mut tracker, &mut log, "healthy", 0.9);
        let before = log.len();
        submit(&dedup, &mut tracker, &mut log, "healthy", 0.85);
        assert_eq!(log.len(), before);
        assert_eq!(tracker.instances("healthy"), 1);
    }

    #[test]
    fn test_events_share_frame_bytes() {
        let dedup = EventDeduplicator::new();
        let mut tracker = ClassTracker::new();
        let mut log = SessionLog::new();
        let shared = frame();

        dedup.consider("debris", 0.4, "00:03", &shared, &mut tracker, &mut log);
        dedup.consider("damage", 0.7, "00:03", &shared, &mut tracker, &mut log);

        assert!(Arc::ptr_eq(&log.events()[0].frame, &log.events()[1].frame));
        assert_eq!(log.events()[1].timestamp, "00:03");
    }
}
