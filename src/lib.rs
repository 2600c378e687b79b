pub mod config;
pub mod models;
pub mod image;
pub mod emotion;
pub mod web;
pub mod utils;

// 重新导出主要类型
pub use config::Config;
pub use emotion::{EmotionPipeline, MoodPrediction};
pub use models::Emotion;
pub use utils::error::MoodError;

pub type Result<T> = std::result::Result<T, MoodError>;
