pub mod annotate;
pub mod config;
pub mod dataset;
pub mod dedup;
pub mod detection;
pub mod error;
pub mod inspect;
pub mod report;
pub mod session;
pub mod severity;
pub mod simulate;
pub mod video;

pub use config::{AppConfig, MissionInfo, SimulationConfig, Turbidity};
pub use dedup::{ClassTracker, DedupDecision, DedupReason, EventDeduplicator, DIFF_THRESHOLD};
pub use detection::{Detection, Detector, FrameContext};
pub use error::InspectionError;
pub use session::{AnomalyEvent, FrameRef, ScanOutcome, SessionLog, SeveritySummary};
pub use severity::Severity;
