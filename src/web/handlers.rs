use crate::{
    emotion::MoodPrediction,
    utils::error::MoodError,
    web::{extractors::RequestId, AppState},
    Result,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::Json,
};
use std::time::Instant;

/// 上传图像所在的表单字段
pub const IMAGE_FIELD: &str = "image";

fn read_error(e: MultipartError) -> MoodError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        MoodError::FileTooLarge(e.body_text())
    } else {
        MoodError::InvalidInput(format!("Failed to read multipart data: {}", e.body_text()))
    }
}

/// Multipart图像上传 → 情绪标签
pub async fn predict_emotion_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<MoodPrediction>> {
    let start_time = Instant::now();

    tracing::info!("Processing emotion request: request_id={}", request_id);

    // 不是multipart请求体，等同于没有上传图像
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Multipart rejected: request_id={}, {}", request_id, rejection);
        MoodError::NoImageProvided
    })?;

    let mut image_data = None;

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        if field_name == IMAGE_FIELD && image_data.is_none() {
            let data = field.bytes().await.map_err(read_error)?;
            tracing::debug!("Received image: {} bytes", data.len());
            image_data = Some(data);
        } else {
            tracing::debug!("Ignoring field: {}", field_name);
        }
    }

    let image_data = image_data.ok_or(MoodError::NoImageProvided)?;

    let prediction = state.pipeline.process_bytes(image_data).await?;

    tracing::info!(
        "Emotion request completed: request_id={}, mood={}, label={}, time={:.3}s",
        request_id,
        prediction.mood,
        prediction.mood_label,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(prediction))
}
