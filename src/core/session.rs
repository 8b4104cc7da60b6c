//! 会话日志 - append-only list of anomaly events shared across detection runs

use super::severity::Severity;
use serde::Serialize;
use std::sync::Arc;

/// Annotated JPEG of the frame an event was logged from. Shared by every
/// event logged from the same frame.
pub type FrameRef = Arc<[u8]>;

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEvent {
    pub class_name: String,
    pub confidence: f32,
    pub timestamp: String,
    #[serde(skip)]
    pub frame: FrameRef,
}

impl AnomalyEvent {
    pub fn severity(&self) -> Severity {
        Severity::of(&self.class_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub normal: usize,
}

/// Overall verdict shown after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Healthy,
    Critical,
    Warning,
}

#[derive(Debug, Default)]
pub struct SessionLog {
    events: Vec<AnomalyEvent>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AnomalyEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[AnomalyEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events per class, most frequent first.
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        class_counts(&self.events)
    }

    pub fn summary(&self) -> SeveritySummary {
        severity_summary(&self.events)
    }

    pub fn outcome(&self) -> ScanOutcome {
        let summary = self.summary();
        if summary.total == 0 {
            ScanOutcome::Healthy
        } else if summary.critical > 0 {
            ScanOutcome::Critical
        } else {
            ScanOutcome::Warning
        }
    }

    pub fn outcome_message(&self) -> String {
        let s = self.summary();
        match self.outcome() {
            ScanOutcome::Healthy => {
                "Scan complete — No anomalies detected. Structure appears healthy.".to_string()
            }
            ScanOutcome::Critical => format!(
                "Scan complete: {} anomaly instance(s) found — {} CRITICAL, {} WARNING, {} NORMAL",
                s.total, s.critical, s.warning, s.normal
            ),
            ScanOutcome::Warning => format!(
                "Scan complete: {} anomaly instance(s) found — {} WARNING, {} NORMAL",
                s.total, s.warning, s.normal
            ),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.events)
    }
}

/// Count per class, most frequent first; equal counts keep first-logged order.
pub fn class_counts(events: &[AnomalyEvent]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for event in events {
        match counts.iter_mut().find(|(name, _)| *name == event.class_name) {
            Some((_, count)) => *count += 1,
            None => counts.push((event.class_name.clone(), 1)),
        }
    }
    // sort_by 是稳定排序
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn severity_summary(events: &[AnomalyEvent]) -> SeveritySummary {
    let mut summary = SeveritySummary {
        total: events.len(),
        ..Default::default()
    };
    for event in events {
        match event.severity() {
            Severity::Critical => summary.critical += 1,
            Severity::Warning => summary.warning += 1,
            Severity::Normal => summary.normal += 1,
        }
    }
    summary
}
