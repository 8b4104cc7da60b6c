pub mod frame;
pub mod scanner;
pub mod source;

pub use frame::{format_clock, FrameInfo, VideoFrame};
pub use scanner::{ScanControl, ScanObserver, ScanPlan, ScanProgress, ScanReport, VideoScanner};
pub use source::{FfmpegSource, FrameSource, MemorySource, VideoProbe};
