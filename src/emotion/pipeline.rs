use crate::{
    emotion::MoodPrediction,
    image::{FacePreprocessor, ImageLoader, ImageTransforms},
    models::{classifier::decode_scores, ModelManager},
    utils::error::MoodError,
    Result,
};
use axum::body::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// 情绪识别流水线
///
/// 解码 → 灰度 → 人脸检测 → 第一张脸裁剪/缩放/归一化 → 分类 → 标签
#[derive(Clone)]
pub struct EmotionPipeline {
    models: Arc<ModelManager>,
}

impl EmotionPipeline {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// 在阻塞线程池中处理上传的图像字节
    pub async fn process_bytes(&self, bytes: Bytes) -> Result<MoodPrediction> {
        let models = Arc::clone(&self.models);

        tokio::task::spawn_blocking(move || Self::run(&models, &bytes))
            .await
            .map_err(|e| MoodError::Internal(format!("Inference task failed: {}", e)))?
    }

    /// 同步处理
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<MoodPrediction> {
        Self::run(&self.models, bytes)
    }

    fn run(models: &ModelManager, bytes: &[u8]) -> Result<MoodPrediction> {
        let start_time = Instant::now();

        let image = ImageLoader::from_bytes(bytes)?;
        let gray = ImageTransforms::to_grayscale(&image);

        let faces = models.detector().detect(&gray)?;
        let detection_time = start_time.elapsed();

        if faces.is_empty() {
            tracing::debug!(
                "No face in {}x{} image ({:.3}s)",
                gray.width(),
                gray.height(),
                detection_time.as_secs_f32()
            );
            return Err(MoodError::NoFaceDetected);
        }

        if faces.len() > 1 {
            tracing::debug!("Detected {} faces, using the first", faces.len());
        }

        // 只处理第一张脸
        let Some(face) = faces.first() else {
            return Err(MoodError::NoFaceProcessed);
        };

        let input = FacePreprocessor::prepare(&gray, face)?;
        let scores = models.classifier().predict(input)?;
        let emotion = decode_scores(&scores)?;

        tracing::info!(
            "Emotion predicted: {} (face={}, area={}, faces={}, detection={:.3}s, total={:.3}s)",
            emotion,
            face,
            face.area(),
            faces.len(),
            detection_time.as_secs_f32(),
            start_time.elapsed().as_secs_f32()
        );

        Ok(MoodPrediction::from(emotion))
    }
}
