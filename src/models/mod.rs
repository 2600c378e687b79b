pub mod cascade;
pub mod classifier;
pub mod grouping;
pub mod labels;
pub mod manager;

pub use cascade::{DetectorInfo, FaceDetector, HaarCascade};
pub use classifier::{ClassifierInfo, EmotionClassifier, EmotionModel};
pub use labels::Emotion;
pub use manager::{ModelManager, ModelStats};
