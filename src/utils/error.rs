use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoodError {
    #[error("No image provided")]
    NoImageProvided,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("No face processed")]
    NoFaceProcessed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Emotion inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Cascade XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl MoodError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MoodError::NoImageProvided
            | MoodError::NoFaceDetected
            | MoodError::NoFaceProcessed
            | MoodError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MoodError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            MoodError::ModelLoad(_) | MoodError::Xml(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            MoodError::NoImageProvided => "NO_IMAGE",
            MoodError::NoFaceDetected => "NO_FACE",
            MoodError::NoFaceProcessed => "NO_FACE_PROCESSED",
            MoodError::InvalidInput(_) => "INVALID_INPUT",
            MoodError::FileTooLarge(_) => "FILE_TOO_LARGE",
            MoodError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            MoodError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            MoodError::Detection(_) => "DETECTION_ERROR",
            MoodError::Inference(_) => "INFERENCE_ERROR",
            MoodError::Config(_) => "CONFIG_ERROR",
            MoodError::Io(_) => "IO_ERROR",
            MoodError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            MoodError::Xml(_) => "CASCADE_XML_ERROR",
            MoodError::Shape(_) => "TENSOR_SHAPE_ERROR",
            MoodError::Ort(_) => "ORT_ERROR",
            MoodError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for MoodError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({}, {})", self, self.error_code(), status);
        } else {
            tracing::info!("Request rejected: {} ({})", self, status);
        }

        // 客户端只依赖 error 字段
        let body = serde_json::json!({ "error": self.to_string() });

        (status, axum::Json(body)).into_response()
    }
}
