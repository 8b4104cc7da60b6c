use image::RgbImage;
use std::time::Duration;

/// 视频帧（RGB）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: RgbImage,
    /// 1-based index of the frame in the stream
    pub frame_number: u64,
    pub timestamp: Duration,
}

impl VideoFrame {
    pub fn new(image: RgbImage, frame_number: u64, fps: f64) -> Self {
        let fps = fps.max(1.0);
        Self {
            image,
            frame_number,
            timestamp: Duration::from_secs_f64(frame_number as f64 / fps),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `MM:SS` of the frame position
    pub fn clock(&self) -> String {
        format_clock(self.timestamp)
    }
}

/// 帧元数据（轻量级，用于进度汇报）
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl FrameInfo {
    pub fn from_frame(frame: &VideoFrame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            timestamp_ms: frame.timestamp.as_millis() as u64,
            frame_number: frame.frame_number,
        }
    }
}

/// Whole minutes and seconds, zero padded; minutes grow past 99.
pub fn format_clock(t: Duration) -> String {
    let secs = t.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Builds an RGB frame from tightly packed rgb24 bytes.
pub fn rgb_from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<RgbImage> {
    RgbImage::from_raw(width, height, data)
}
