use crate::core::error::InspectionError;
use serde::{Deserialize, Serialize};

/// FRB 友好的错误类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<InspectionError> for ApiError {
    fn from(e: InspectionError) -> Self {
        let error_type = match &e {
            InspectionError::Io(_) => "Io",
            InspectionError::Image(_) => "Image",
            InspectionError::Json(_) => "Json",
            InspectionError::Config(_) => "Config",
            InspectionError::ModelLoadFailed(_) => "ModelLoadFailed",
            InspectionError::Inference(_) => "Inference",
            InspectionError::Video(_) => "Video",
            InspectionError::Report(_) => "Report",
            InspectionError::Network(_) => "Network",
            InspectionError::InvalidInput(_) => "InvalidInput",
        };
        Self::new(error_type, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_inspection_error() {
        let err: ApiError = InspectionError::Video("no video stream".to_string()).into();
        assert_eq!(err.error_type, "Video");
        assert_eq!(err.to_string(), "[Video] Video error: no video stream");
    }
}
