use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("Inference error: {0}")]
    Inference(String),
    #[error("Video error: {0}")]
    Video(String),
    #[error("Report error: {0}")]
    Report(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<json5::Error> for InspectionError {
    fn from(e: json5::Error) -> Self {
        InspectionError::Config(e.to_string())
    }
}

impl From<printpdf::Error> for InspectionError {
    fn from(e: printpdf::Error) -> Self {
        InspectionError::Report(e.to_string())
    }
}
