use crate::Result;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

pub struct ImageLoader;

impl ImageLoader {
    /// 从上传的字节解码为彩色图像
    ///
    /// 丢弃alpha通道，并按EXIF方向信息旋转。
    pub fn from_bytes(bytes: &[u8]) -> Result<RgbImage> {
        let image = Self::decode(bytes)?;
        Ok(image.to_rgb8())
    }

    /// 解码任意受支持格式的图像
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;

        // 无法识别的格式在这里返回 Unsupported
        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);

        tracing::debug!(
            "Decoded {:?} image: {}x{}",
            Self::detect_format(bytes),
            image.width(),
            image.height()
        );

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }
}
