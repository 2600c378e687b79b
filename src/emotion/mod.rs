pub mod pipeline;
pub mod types;

pub use pipeline::EmotionPipeline;
pub use types::{FaceRegion, MoodPrediction};
