use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Classifier inference failed: {0}")]
    Inference(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AnalysisError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            AnalysisError::Decode(_) => "DECODE_ERROR",
            AnalysisError::Inference(_) => "INFERENCE_ERROR",
            AnalysisError::Encode(_) => "ENCODE_ERROR",
            AnalysisError::InvalidInput(_) => "INVALID_INPUT",
            AnalysisError::Config(_) => "CONFIG_ERROR",
            AnalysisError::Io(_) => "IO_ERROR",
            AnalysisError::Json(_) => "JSON_ERROR",
            AnalysisError::Base64(_) => "BASE64_DECODE_ERROR",
            AnalysisError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 统一的请求失败记录，不携带任何图像或百分比
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_record_carries_code_and_original_message() {
        let err = AnalysisError::Decode("not an image".to_string());
        let body = err.to_json();

        assert_eq!(body["error"]["code"], "DECODE_ERROR");
        assert_eq!(body["error"]["message"], "Image decode failed: not an image");
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn open() -> crate::Result<Vec<u8>> {
            Ok(std::fs::read("/definitely/not/here.png")?)
        }

        let err = open().unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
