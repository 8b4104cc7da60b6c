//! 配置 - JSON5 file, every field optional

use super::error::InspectionError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MIN_CONFIDENCE: f32 = 0.10;
pub const MAX_CONFIDENCE: f32 = 1.0;
pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_PARTICLES: u32 = 150;
pub const BASELINE_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.2.0/yolov8n.onnx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Turbidity {
    Low,
    #[default]
    Medium,
    High,
}

impl Turbidity {
    pub const ALL: [Turbidity; 3] = [Turbidity::Low, Turbidity::Medium, Turbidity::High];

    /// Gaussian kernel size
    pub fn kernel(&self) -> u32 {
        match self {
            Turbidity::Low => 3,
            Turbidity::Medium => 7,
            Turbidity::High => 15,
        }
    }

    pub fn noise_factor(&self) -> f32 {
        match self {
            Turbidity::Low => 0.05,
            Turbidity::Medium => 0.1,
            Turbidity::High => 0.2,
        }
    }
}

impl std::str::FromStr for Turbidity {
    type Err = InspectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Turbidity::Low),
            "medium" => Ok(Turbidity::Medium),
            "high" => Ok(Turbidity::High),
            other => Err(InspectionError::Config(format!(
                "unknown turbidity level '{}' (expected low, medium or high)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub turbidity: Turbidity,
    pub marine_snow: bool,
    pub particles: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            turbidity: Turbidity::Medium,
            marine_snow: true,
            particles: DEFAULT_PARTICLES,
        }
    }
}

/// Operator overrides for the scan plan; `None` keeps the recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub skip: Option<u32>,
    pub max_frames: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights: PathBuf,
    /// 基线模型缓存目录
    pub dir: PathBuf,
    pub baseline_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("weights/best.onnx"),
            dir: PathBuf::from("models"),
            baseline_url: BASELINE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionInfo {
    pub name: String,
    pub operator: String,
    pub vessel: String,
    pub location: String,
}

impl Default for MissionInfo {
    fn default() -> Self {
        Self {
            name: "Subsea Inspection Mission".to_string(),
            operator: "NautiCAI Operator".to_string(),
            vessel: "ROV-NautiCAI-01".to_string(),
            location: "Offshore Location".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub confidence: f32,
    pub simulation: SimulationConfig,
    pub video: VideoConfig,
    pub model: ModelConfig,
    pub mission: MissionInfo,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            simulation: SimulationConfig::default(),
            video: VideoConfig::default(),
            model: ModelConfig::default(),
            mission: MissionInfo::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json5(text: &str) -> Result<Self, InspectionError> {
        let mut config: AppConfig = json5::from_str(text)?;
        config.confidence = clamp_confidence(config.confidence);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, InspectionError> {
        info!("📖 Loading config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_json5(&text)
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = clamp_confidence(confidence);
    }
}

pub fn clamp_confidence(confidence: f32) -> f32 {
    if !confidence.is_finite() {
        warn!("⚠️ Invalid confidence {}, using {}", confidence, DEFAULT_CONFIDENCE);
        return DEFAULT_CONFIDENCE;
    }
    let clamped = confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    if clamped != confidence {
        warn!("⚠️ Confidence {} clamped to {}", confidence, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.confidence, 0.25);
        assert!(!config.simulation.enabled);
        assert_eq!(config.simulation.turbidity, Turbidity::Medium);
        assert_eq!(config.simulation.particles, 150);
        assert_eq!(config.model.weights, PathBuf::from("weights/best.onnx"));
        assert_eq!(config.mission.vessel, "ROV-NautiCAI-01");
    }

    #[test]
    fn test_partial_json5() {
        let text = r#"{
            // night dive
            confidence: 0.4,
            simulation: { enabled: true, turbidity: "high" },
            video: { skip: 5 },
            mission: { name: "Pier 7", },
        }"#;
        let config = AppConfig::from_json5(text).unwrap();
        assert_eq!(config.confidence, 0.4);
        assert!(config.simulation.enabled);
        assert_eq!(config.simulation.turbidity, Turbidity::High);
        assert!(config.simulation.marine_snow);
        assert_eq!(config.video.skip, Some(5));
        assert_eq!(config.video.max_frames, None);
        assert_eq!(config.mission.name, "Pier 7");
        assert_eq!(config.mission.operator, "NautiCAI Operator");
    }

    #[test]
    fn test_confidence_clamped() {
        let config = AppConfig::from_json5("{ confidence: 0.01 }").unwrap();
        assert_eq!(config.confidence, MIN_CONFIDENCE);

        let mut config = AppConfig::default();
        config.set_confidence(3.0);
        assert_eq!(config.confidence, 1.0);
        config.set_confidence(f32::NAN);
        assert_eq!(config.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_bad_turbidity_rejected() {
        let result = AppConfig::from_json5(r#"{ simulation: { turbidity: "murky" } }"#);
        assert!(matches!(result, Err(InspectionError::Config(_))));
        assert!("murky".parse::<Turbidity>().is_err());
        assert_eq!("HIGH".parse::<Turbidity>().unwrap(), Turbidity::High);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nauticai.json5");
        std::fs::write(&path, "{ model: { dir: 'cache' } }").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.model.dir, PathBuf::from("cache"));
        assert_eq!(config.model.baseline_url, BASELINE_URL);
    }
}
