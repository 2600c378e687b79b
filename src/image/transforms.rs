use crate::emotion::FaceRegion;
use crate::utils::error::MoodError;
use crate::Result;
use image::{imageops, GrayImage, RgbImage};

// BT.601 亮度系数，14位定点
const GRAY_SHIFT: u32 = 14;
const R_TO_Y: u32 = 4899;
const G_TO_Y: u32 = 9617;
const B_TO_Y: u32 = 1868;

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 彩色转灰度: Y = 0.299 R + 0.587 G + 0.114 B
    pub fn to_grayscale(image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let luma = image
            .as_raw()
            .chunks_exact(3)
            .map(|px| {
                let y = px[0] as u32 * R_TO_Y
                    + px[1] as u32 * G_TO_Y
                    + px[2] as u32 * B_TO_Y
                    + (1 << (GRAY_SHIFT - 1));
                (y >> GRAY_SHIFT) as u8
            })
            .collect();

        // 像素数量与尺寸一致，from_raw不会失败
        GrayImage::from_raw(width, height, luma).unwrap_or_else(|| GrayImage::new(width, height))
    }

    /// 双线性插值缩放（像素中心对齐）
    pub fn resize_bilinear(image: &GrayImage, dst_width: u32, dst_height: u32) -> Result<GrayImage> {
        let (src_width, src_height) = image.dimensions();

        if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
            return Err(MoodError::ImageProcessing(format!(
                "Cannot resize {}x{} image to {}x{}",
                src_width, src_height, dst_width, dst_height
            )));
        }

        if (src_width, src_height) == (dst_width, dst_height) {
            return Ok(image.clone());
        }

        let x_taps = Self::linear_taps(src_width, dst_width);
        let y_taps = Self::linear_taps(src_height, dst_height);
        let raw = image.as_raw();
        let stride = src_width as usize;

        let mut resized = Vec::with_capacity(dst_width as usize * dst_height as usize);

        for &(y0, y1, fy) in &y_taps {
            let row0 = &raw[y0 * stride..(y0 + 1) * stride];
            let row1 = &raw[y1 * stride..(y1 + 1) * stride];

            for &(x0, x1, fx) in &x_taps {
                let top = row0[x0] as f32 * (1.0 - fx) + row0[x1] as f32 * fx;
                let bottom = row1[x0] as f32 * (1.0 - fx) + row1[x1] as f32 * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                resized.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }

        GrayImage::from_raw(dst_width, dst_height, resized).ok_or_else(|| {
            MoodError::ImageProcessing("Resized buffer does not match target size".to_string())
        })
    }

    /// 每个目标坐标对应的两个源坐标及插值权重
    fn linear_taps(src_len: u32, dst_len: u32) -> Vec<(usize, usize, f32)> {
        let scale = src_len as f32 / dst_len as f32;
        let last = (src_len - 1) as usize;

        (0..dst_len)
            .map(|d| {
                let pos = (d as f32 + 0.5) * scale - 0.5;
                let floor = pos.floor();

                if floor < 0.0 {
                    return (0, 1.min(last), 0.0);
                }

                let i0 = floor as usize;
                if i0 >= last {
                    return (last, last, 0.0);
                }

                (i0, i0 + 1, pos - floor)
            })
            .collect()
    }

    /// 按人脸矩形裁剪，超出边界部分被截断
    pub fn crop(image: &GrayImage, region: &FaceRegion) -> Result<GrayImage> {
        let (width, height) = image.dimensions();

        let x0 = region.x.min(width);
        let y0 = region.y.min(height);
        let x1 = region.x.saturating_add(region.width).min(width);
        let y1 = region.y.saturating_add(region.height).min(height);

        if x1 <= x0 || y1 <= y0 {
            return Err(MoodError::ImageProcessing(format!(
                "Face region {} lies outside the {}x{} image",
                region, width, height
            )));
        }

        Ok(imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_grayscale_uses_bt601_weights() {
        let mut rgb = RgbImage::new(4, 1);
        rgb.put_pixel(0, 0, Rgb([255, 255, 255]));
        rgb.put_pixel(1, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(2, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(3, 0, Rgb([0, 0, 255]));

        let gray = ImageTransforms::to_grayscale(&rgb);

        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 76);
        assert_eq!(gray.get_pixel(2, 0).0[0], 150);
        assert_eq!(gray.get_pixel(3, 0).0[0], 29);
    }

    #[test]
    fn test_resize_keeps_flat_image_flat() {
        let gray = GrayImage::from_pixel(37, 91, Luma([128]));
        let resized = ImageTransforms::resize_bilinear(&gray, 48, 48).unwrap();

        assert_eq!(resized.dimensions(), (48, 48));
        assert!(resized.pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn test_resize_upscales_single_pixel() {
        let gray = GrayImage::from_pixel(1, 1, Luma([7]));
        let resized = ImageTransforms::resize_bilinear(&gray, 3, 2).unwrap();

        assert_eq!(resized.dimensions(), (3, 2));
        assert!(resized.pixels().all(|p| p.0[0] == 7));
    }

    #[test]
    fn test_resize_interpolates_between_columns() {
        // 左黑右白，放大后中间出现过渡值
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        let resized = ImageTransforms::resize_bilinear(&gray, 4, 1).unwrap();
        let row: Vec<u8> = resized.pixels().map(|p| p.0[0]).collect();

        assert_eq!(row, vec![0, 50, 150, 200]);
    }

    #[test]
    fn test_resize_rejects_empty_source() {
        let gray = GrayImage::new(0, 0);
        assert!(ImageTransforms::resize_bilinear(&gray, 48, 48).is_err());
    }

    #[test]
    fn test_crop_clamps_to_image_bounds() {
        let gray = GrayImage::from_fn(10, 10, |x, y| Luma([(x + 10 * y) as u8]));
        let region = FaceRegion::new(6, 7, 8, 8);

        let cropped = ImageTransforms::crop(&gray, &region).unwrap();

        assert_eq!(cropped.dimensions(), (4, 3));
        assert_eq!(cropped.get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn test_crop_outside_image_fails() {
        let gray = GrayImage::new(10, 10);
        let region = FaceRegion::new(10, 0, 5, 5);

        assert!(ImageTransforms::crop(&gray, &region).is_err());
    }
}
