use crate::models::classifier::{decode_scores, input_shape, ClassifierInfo, EmotionModel};
use crate::models::cascade::{DetectorInfo, FaceDetector};
use crate::models::{EmotionClassifier, HaarCascade};
use crate::{Config, Result};
use ndarray::Array4;
use std::sync::Arc;

/// 进程级模型容器：启动时加载一次，之后只读共享
pub struct ModelManager {
    detector: Arc<dyn FaceDetector>,
    classifier: Arc<dyn EmotionModel>,
}

impl ModelManager {
    /// 按配置加载人脸检测器和情绪分类器
    pub fn load(config: &Config) -> Result<Self> {
        tracing::info!("Initializing model manager...");

        let detector = Arc::new(HaarCascade::from_file(&config.cascade_path())?);
        let classifier = Arc::new(EmotionClassifier::new(config)?);

        tracing::info!("Model manager initialized successfully");
        Ok(Self::new(detector, classifier))
    }

    /// 使用已构造好的模型
    pub fn new(detector: Arc<dyn FaceDetector>, classifier: Arc<dyn EmotionModel>) -> Self {
        Self {
            detector,
            classifier,
        }
    }

    /// 获取检测器引用
    pub fn detector(&self) -> &dyn FaceDetector {
        self.detector.as_ref()
    }

    /// 获取分类器引用
    pub fn classifier(&self) -> &dyn EmotionModel {
        self.classifier.as_ref()
    }

    /// 用空白输入跑一次分类器，确认输出维度
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");

        let probe = Array4::<f32>::zeros(input_shape());
        let scores = self.classifier.predict(probe)?;
        decode_scores(&scores)?;

        tracing::debug!("Model health check passed");
        Ok(())
    }

    /// 获取模型统计信息
    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            detector: self.detector.describe(),
            classifier: self.classifier.describe(),
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub detector: DetectorInfo,
    pub classifier: ClassifierInfo,
}
