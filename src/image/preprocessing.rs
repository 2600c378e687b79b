use crate::emotion::FaceRegion;
use crate::image::ImageTransforms;
use crate::utils::error::MoodError;
use crate::Result;
use image::GrayImage;
use ndarray::Array4;

/// 分类器输入边长
pub const FACE_SIZE: u32 = 48;

pub struct FacePreprocessor;

impl FacePreprocessor {
    /// 裁剪人脸 → 缩放到48x48 → 归一化到[0,1] → (1, 48, 48, 1)
    pub fn prepare(gray: &GrayImage, region: &FaceRegion) -> Result<Array4<f32>> {
        let face = ImageTransforms::crop(gray, region)?;
        let resized = ImageTransforms::resize_bilinear(&face, FACE_SIZE, FACE_SIZE)?;
        Self::to_tensor(&resized)
    }

    /// 灰度人脸转为NHWC张量
    pub fn to_tensor(face: &GrayImage) -> Result<Array4<f32>> {
        if face.dimensions() != (FACE_SIZE, FACE_SIZE) {
            return Err(MoodError::ImageProcessing(format!(
                "Face must be {}x{}, got {}x{}",
                FACE_SIZE,
                FACE_SIZE,
                face.width(),
                face.height()
            )));
        }

        let size = FACE_SIZE as usize;
        let normalized: Vec<f32> = face.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        let tensor = Array4::from_shape_vec((1, size, size, 1), normalized)?;

        Ok(tensor)
    }
}
