use crate::image::FACE_SIZE;
use crate::models::Emotion;
use crate::utils::error::MoodError;
use crate::{Config, Result};
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// 情绪分类能力：(1, 48, 48, 1) 输入 → 7个类别得分
pub trait EmotionModel: Send + Sync {
    fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>>;

    fn describe(&self) -> ClassifierInfo;
}

/// 分类器统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierInfo {
    pub kind: &'static str,
    pub input_shape: [usize; 4],
    pub labels: Vec<&'static str>,
}

/// 模型期望的输入形状 (N, H, W, C)
pub fn input_shape() -> [usize; 4] {
    [1, FACE_SIZE as usize, FACE_SIZE as usize, 1]
}

/// 最大得分的索引，并列时取最小索引
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }

    best.map(|(i, _)| i)
}

/// 得分向量 → 情绪类别
pub fn decode_scores(scores: &[f32]) -> Result<Emotion> {
    if scores.len() != Emotion::COUNT {
        return Err(MoodError::Inference(format!(
            "Expected {} class scores, got {}",
            Emotion::COUNT,
            scores.len()
        )));
    }

    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(MoodError::Inference(format!("Non-finite class score: {}", bad)));
    }

    argmax(scores)
        .and_then(Emotion::from_index)
        .ok_or_else(|| MoodError::Inference("Empty class scores".to_string()))
}

pub struct EmotionClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
}

impl EmotionClassifier {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = config.classifier_model_path();

        if !model_path.exists() {
            return Err(MoodError::ModelLoad(format!(
                "Emotion model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading emotion model from: {}", model_path.display());

        let optimization = match config.onnx_config.optimization_level {
            i32::MIN..=0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };

        let session = Session::builder()?
            .with_optimization_level(optimization)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(&model_path)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(MoodError::ModelLoad(
                    "Emotion model has no inputs".to_string(),
                ))
            }
        };

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(MoodError::ModelLoad(
                    "Emotion model has no outputs".to_string(),
                ))
            }
        };

        tracing::info!("Emotion model input: '{}', output: '{}'", input_name, output_name);

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Emotion output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
        })
    }
}

impl EmotionModel for EmotionClassifier {
    fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        if input.shape() != input_shape() {
            return Err(MoodError::Inference(format!(
                "Expected input shape {:?}, got {:?}",
                input_shape(),
                input.shape()
            )));
        }

        let input_tensor = Tensor::from_array(input)?;
        let scores = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.iter().copied().collect::<Vec<f32>>(),
                None => {
                    let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                    return Err(MoodError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available
                    )));
                }
            }
        };

        tracing::debug!("Emotion scores: {:?}", scores);

        Ok(scores)
    }

    fn describe(&self) -> ClassifierInfo {
        ClassifierInfo {
            kind: "onnx",
            input_shape: input_shape(),
            labels: Emotion::labels(),
        }
    }
}
