pub mod loader;
pub mod preprocessing;
pub mod transforms;

pub use loader::ImageLoader;
pub use preprocessing::{FacePreprocessor, FACE_SIZE};
pub use transforms::ImageTransforms;
