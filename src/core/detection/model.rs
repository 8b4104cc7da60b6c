//! 模型管理 - custom weights first, otherwise the baseline model fetched on demand

use crate::core::config::ModelConfig;
use crate::core::error::InspectionError;
use log::{info, warn};
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BASELINE_FILE: &str = "yolov8n.onnx";
const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const MIN_MODEL_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Fine-tuned weights shipped with the deployment
    Custom(PathBuf),
    /// Generic COCO model used when no custom weights exist
    Baseline(PathBuf),
}

impl ModelSource {
    pub fn path(&self) -> &Path {
        match self {
            ModelSource::Custom(p) | ModelSource::Baseline(p) => p,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelSource::Custom(_) => "Custom YOLOv8s",
            ModelSource::Baseline(_) => "YOLOv8n Baseline",
        }
    }
}

pub struct ModelManager {
    weights: PathBuf,
    model_dir: PathBuf,
    baseline_url: String,
}

impl ModelManager {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            model_dir: config.dir.clone(),
            baseline_url: config.baseline_url.clone(),
        }
    }

    /// Picks the model to load, downloading the baseline if needed.
    pub fn resolve(&self) -> Result<ModelSource, InspectionError> {
        if self.weights.is_file() {
            info!("🧠 Using custom weights at {:?}", self.weights);
            return Ok(ModelSource::Custom(self.weights.clone()));
        }

        warn!(
            "⚠️ Custom weights not found at {:?}, falling back to baseline",
            self.weights
        );
        self.ensure_baseline().map(ModelSource::Baseline)
    }

    pub fn ensure_baseline(&self) -> Result<PathBuf, InspectionError> {
        let target = self.model_dir.join(BASELINE_FILE);
        if target.is_file() {
            info!("✓ Baseline model cached at {:?}", target);
            return Ok(target);
        }

        if !self.baseline_url.starts_with("https://") {
            return Err(InspectionError::ModelLoadFailed(format!(
                "refusing non-HTTPS model URL: {}",
                self.baseline_url
            )));
        }

        fs::create_dir_all(&self.model_dir)?;
        info!("⬇️ Downloading baseline model from {}", self.baseline_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;
        let resp = client.get(&self.baseline_url).send()?;
        if !resp.status().is_success() {
            return Err(InspectionError::ModelLoadFailed(format!(
                "download failed: HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp.bytes()?;
        if bytes.len() < MIN_MODEL_BYTES {
            return Err(InspectionError::ModelLoadFailed(format!(
                "downloaded file too small ({} bytes)",
                bytes.len()
            )));
        }

        // 先写临时文件再重命名，避免半截文件
        let tmp = target.with_extension("onnx.part");
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!("✅ Baseline model saved to {:?} ({} bytes)", target, bytes.len());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path, url: &str) -> ModelConfig {
        ModelConfig {
            weights: dir.join("weights").join("best.onnx"),
            dir: dir.join("models"),
            baseline_url: url.to_string(),
        }
    }

    #[test]
    fn test_custom_weights_preferred() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), "https://example.invalid/yolov8n.onnx");
        fs::create_dir_all(cfg.weights.parent().unwrap()).unwrap();
        fs::write(&cfg.weights, b"onnx").unwrap();

        let source = ModelManager::new(&cfg).resolve().unwrap();
        assert_eq!(source, ModelSource::Custom(cfg.weights.clone()));
        assert_eq!(source.label(), "Custom YOLOv8s");
    }

    #[test]
    fn test_cached_baseline_used_without_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), "https://example.invalid/yolov8n.onnx");
        fs::create_dir_all(&cfg.dir).unwrap();
        fs::write(cfg.dir.join(BASELINE_FILE), b"onnx").unwrap();

        let source = ModelManager::new(&cfg).resolve().unwrap();
        assert_eq!(source.label(), "YOLOv8n Baseline");
        assert_eq!(source.path(), cfg.dir.join(BASELINE_FILE).as_path());
    }

    #[test]
    fn test_plain_http_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), "http://example.invalid/yolov8n.onnx");

        let result = ModelManager::new(&cfg).ensure_baseline();
        assert!(matches!(result, Err(InspectionError::ModelLoadFailed(_))));
    }
}
