//! 帧来源 - ffmpeg subprocess or frames handed in by the UI layer

use super::frame::{rgb_from_raw, VideoFrame};
use crate::core::error::InspectionError;
use image::RgbImage;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

static FRAME_RATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)(?:/(\d+(?:\.\d+)?))?\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub frame_count: u64,
    /// never below 1.0
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// seconds
    pub duration: f64,
}

impl VideoProbe {
    pub fn new(frame_count: u64, fps: f64, width: u32, height: u32) -> Self {
        let fps = if fps.is_finite() { fps.max(1.0) } else { 1.0 };
        Self {
            frame_count,
            fps,
            width,
            height,
            duration: frame_count as f64 / fps,
        }
    }
}

pub trait FrameSource {
    fn probe(&self) -> VideoProbe;

    /// Next frame in stream order, `None` once exhausted.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, InspectionError>;
}

/// In-memory frames, e.g. decoded by the host platform.
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    probe: VideoProbe,
    read: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        let probe = VideoProbe::new(frames.len() as u64, fps, width, height);
        Self {
            frames: frames.into(),
            probe,
            read: 0,
        }
    }

    /// Decodes each encoded image (JPEG / PNG) into a frame.
    pub fn from_encoded(frames: &[Vec<u8>], fps: f64) -> Result<Self, InspectionError> {
        let decoded = frames
            .iter()
            .map(|bytes| crate::core::annotate::decode_image(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(decoded, fps))
    }
}

impl FrameSource for MemorySource {
    fn probe(&self) -> VideoProbe {
        self.probe
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, InspectionError> {
        Ok(self.frames.pop_front().map(|image| {
            self.read += 1;
            VideoFrame::new(image, self.read, self.probe.fps)
        }))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parses ffprobe rates such as `30000/1001` or `25`.
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let caps = FRAME_RATE_RE.captures(text)?;
    let num: f64 = caps.get(1)?.as_str().parse().ok()?;
    let den: f64 = match caps.get(2) {
        Some(d) => d.as_str().parse().ok()?,
        None => 1.0,
    };
    if den == 0.0 {
        return None;
    }
    let rate = num / den;
    (rate > 0.0).then_some(rate)
}

/// Decodes a video file through the `ffmpeg` / `ffprobe` binaries.
pub struct FfmpegSource {
    path: PathBuf,
    probe: VideoProbe,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    read: u64,
    /// 读到结尾后不再重启解码器
    exhausted: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, InspectionError> {
        if !path.is_file() {
            return Err(InspectionError::InvalidInput(format!(
                "video not found: {}",
                path.display()
            )));
        }
        let probe = Self::run_probe(path)?;
        info!(
            "🎬 {:?}: {} frames @ {:.1} fps, {:.1}s, {}x{}",
            path, probe.frame_count, probe.fps, probe.duration, probe.width, probe.height
        );
        Ok(Self {
            path: path.to_path_buf(),
            probe,
            child: None,
            stdout: None,
            read: 0,
            exhausted: false,
        })
    }

    fn run_probe(path: &Path) -> Result<VideoProbe, InspectionError> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| InspectionError::Video(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(InspectionError::Video(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = parsed
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| InspectionError::Video("no video stream".to_string()))?;
        Self::probe_from_stream(stream)
    }

    fn probe_from_stream(stream: FfprobeStream) -> Result<VideoProbe, InspectionError> {
        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(InspectionError::Video("video stream has no frame size".to_string())),
        };

        let fps = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(1.0);

        let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
            Some(n) => n,
            None => {
                // 部分容器不写 nb_frames，用时长估算
                let duration: f64 = stream
                    .duration
                    .as_deref()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0.0);
                warn!("⚠️ frame count missing, estimating from duration {:.1}s", duration);
                (duration * fps.max(1.0)).round() as u64
            }
        };

        Ok(VideoProbe::new(frame_count, fps, width, height))
    }

    /// ffprobe reports coded width/height, so rotation metadata must not be
    /// applied or frames would not match the probed size.
    fn decoder_args(path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(path.as_os_str().to_os_string());
        args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"].into_iter().map(OsString::from));
        args
    }

    fn spawn(&mut self) -> Result<(), InspectionError> {
        let mut child = Command::new("ffmpeg")
            .args(Self::decoder_args(&self.path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InspectionError::Video(format!("failed to run ffmpeg: {}", e)))?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        debug!("ffmpeg decoder started for {:?}", self.path);
        Ok(())
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegSource {
    fn probe(&self) -> VideoProbe {
        self.probe
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, InspectionError> {
        if self.exhausted {
            return Ok(None);
        }
        if self.child.is_none() {
            self.spawn()?;
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.probe.width as usize * self.probe.height as usize * 3;
        let mut buf = vec![0u8; frame_len];
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("ffmpeg stream ended after {} frames", self.read);
                self.exhausted = true;
                self.stop();
                return Ok(None);
            }
            Err(e) => {
                self.exhausted = true;
                self.stop();
                return Err(e.into());
            }
        }

        let image = rgb_from_raw(self.probe.width, self.probe.height, buf)
            .ok_or_else(|| InspectionError::Video("short rgb24 frame".to_string()))?;
        self.read += 1;
        Ok(Some(VideoFrame::new(image, self.read, self.probe.fps)))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}
