use crate::emotion::FaceRegion;
use crate::image::ImageTransforms;
use crate::models::grouping::{group_rectangles, GROUP_EPS};
use crate::utils::error::MoodError;
use crate::Result;
use image::GrayImage;
use roxmltree::{Document, Node};
use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

/// 图像金字塔相邻层的缩放比例
pub const SCALE_FACTOR: f64 = 1.3;

/// 保留一个检测结果所需的最少相邻候选数
pub const MIN_NEIGHBORS: usize = 3;

/// 级阈值加载时减去的容差，与OpenCV的判定边界一致
const THRESHOLD_EPS: f64 = 1e-5;

/// 人脸检测能力
pub trait FaceDetector: Send + Sync {
    /// 返回检测到的人脸矩形，顺序由检测器决定
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>>;

    fn describe(&self) -> DetectorInfo;
}

/// 检测器统计信息
#[derive(Debug, Clone, Serialize)]
pub struct DetectorInfo {
    pub kind: &'static str,
    pub window: (u32, u32),
    pub stages: usize,
    pub features: usize,
    pub scale_factor: f64,
    pub min_neighbors: usize,
}

/// 积分图与平方积分图
pub struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    squared: Vec<u64>,
}

impl IntegralImage {
    pub fn new(image: &GrayImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut squared = vec![0u64; stride * (height + 1)];
        let raw = image.as_raw();

        for y in 0..height {
            let mut row = 0u64;
            let mut row_squared = 0u64;
            for x in 0..width {
                let v = raw[y * width + x] as u64;
                row += v;
                row_squared += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                squared[(y + 1) * stride + x + 1] = squared[y * stride + x + 1] + row_squared;
            }
        }

        Self { stride, sum, squared }
    }

    fn corners(table: &[u64], stride: usize, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);

        (table[y1 * stride + x1] + table[y0 * stride + x0])
            - (table[y0 * stride + x1] + table[y1 * stride + x0])
    }

    /// 矩形内像素和
    pub fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::corners(&self.sum, self.stride, x, y, width, height)
    }

    /// 矩形内像素平方和
    pub fn squared_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        Self::corners(&self.squared, self.stride, x, y, width, height)
    }
}

#[derive(Debug, Clone)]
struct HaarRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<HaarRect>,
}

impl HaarFeature {
    fn value(&self, integral: &IntegralImage, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// 决策树节点；子节点 <= 0 表示叶子 `-child`
#[derive(Debug, Clone)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    fn predict(&self, mut feature_value: impl FnMut(usize) -> f64) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let next = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };

            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            idx = next as usize;
        }
    }
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

enum Verdict {
    Face,
    Rejected { stage: usize },
}

/// OpenCV格式的Haar级联分类器
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MoodError::ModelLoad(format!(
                "Face cascade not found: {}",
                path.display()
            )));
        }

        tracing::info!("Loading face cascade from: {}", path.display());

        let xml = std::fs::read_to_string(path)?;
        let cascade = Self::from_xml(&xml)?;

        tracing::info!(
            "Face cascade loaded: window={}x{}, stages={}, features={}",
            cascade.window.0,
            cascade.window.1,
            cascade.stages.len(),
            cascade.features.len()
        );

        Ok(cascade)
    }

    /// 解析 `opencv-cascade-classifier` 格式（BOOST + HAAR）
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();

        let cascade = elements(root)
            .find(|n| n.attribute("type_id") == Some("opencv-cascade-classifier"))
            .or_else(|| elements(root).find(|n| n.has_tag_name("cascade")))
            .ok_or_else(|| {
                MoodError::ModelLoad(
                    "Not an OpenCV cascade classifier (old-style haarcascade files are not supported)"
                        .to_string(),
                )
            })?;

        let stage_type = text(child(cascade, "stageType")?);
        if stage_type != "BOOST" {
            return Err(MoodError::ModelLoad(format!("Unsupported stage type: {}", stage_type)));
        }

        let feature_type = text(child(cascade, "featureType")?);
        if feature_type != "HAAR" {
            return Err(MoodError::ModelLoad(format!(
                "Unsupported feature type: {}",
                feature_type
            )));
        }

        if let Some(params) = elements(cascade).find(|n| n.has_tag_name("featureParams")) {
            if let Some(cat) = elements(params).find(|n| n.has_tag_name("maxCatCount")) {
                if parse_value::<u32>(cat)? > 0 {
                    return Err(MoodError::ModelLoad(
                        "Categorical cascade features are not supported".to_string(),
                    ));
                }
            }
        }

        let width: u32 = parse_value(child(cascade, "width")?)?;
        let height: u32 = parse_value(child(cascade, "height")?)?;
        if width < 3 || height < 3 {
            return Err(MoodError::ModelLoad(format!(
                "Cascade window {}x{} is too small",
                width, height
            )));
        }

        let features = elements(child(cascade, "features")?)
            .map(|f| parse_feature(f, width, height))
            .collect::<Result<Vec<_>>>()?;

        let stages = elements(child(cascade, "stages")?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>>>()?;

        if stages.is_empty() {
            return Err(MoodError::ModelLoad("Cascade has no stages".to_string()));
        }

        Ok(Self {
            window: (width, height),
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// 多尺度滑窗检测
    pub fn detect_multi_scale(
        &self,
        gray: &GrayImage,
        scale_factor: f64,
        min_neighbors: usize,
    ) -> Result<Vec<FaceRegion>> {
        if scale_factor <= 1.0 {
            return Err(MoodError::Detection(format!(
                "Scale factor must be greater than 1, got {}",
                scale_factor
            )));
        }

        let (image_w, image_h) = gray.dimensions();
        let (win_w, win_h) = self.window;
        let mut candidates = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let scaled_w = (image_w as f64 / factor).round() as u32;
            let scaled_h = (image_h as f64 / factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }

            let region_w = (win_w as f64 * factor).round() as u32;
            let region_h = (win_h as f64 * factor).round() as u32;

            let scaled: Cow<'_, GrayImage> = if (scaled_w, scaled_h) == (image_w, image_h) {
                Cow::Borrowed(gray)
            } else {
                Cow::Owned(ImageTransforms::resize_bilinear(gray, scaled_w, scaled_h)?)
            };
            let integral = IntegralImage::new(&scaled);

            // 大尺度层逐像素扫描
            let step = if factor > 2.0 { 1 } else { 2 };

            let mut y = 0;
            while y + win_h <= scaled_h {
                let mut x = 0;
                while x + win_w <= scaled_w {
                    match self.evaluate(&integral, x, y) {
                        Verdict::Face => candidates.push(FaceRegion::new(
                            (x as f64 * factor).round() as u32,
                            (y as f64 * factor).round() as u32,
                            region_w,
                            region_h,
                        )),
                        // 第一级就被拒绝，跳过相邻窗口
                        Verdict::Rejected { stage: 0 } => x += step,
                        Verdict::Rejected { .. } => {}
                    }
                    x += step;
                }
                y += step;
            }

            factor *= scale_factor;
        }

        let faces = group_rectangles(&candidates, min_neighbors, GROUP_EPS);

        tracing::debug!(
            "Cascade scan: {}x{} image, {} candidates, {} faces",
            image_w,
            image_h,
            candidates.len(),
            faces.len()
        );

        Ok(faces)
    }

    fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32) -> Verdict {
        let (win_w, win_h) = self.window;

        // 方差归一化使用去掉一像素边框的窗口
        let (inner_w, inner_h) = (win_w - 2, win_h - 2);
        let area = (inner_w * inner_h) as f64;
        let sum = integral.sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let squared = integral.squared_sum(x + 1, y + 1, inner_w, inner_h) as f64;
        let variance = area * squared - sum * sum;
        let norm = if variance > 0.0 { 1.0 / variance.sqrt() } else { 1.0 };

        for (index, stage) in self.stages.iter().enumerate() {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|weak| weak.predict(|f| self.features[f].value(integral, x, y) * norm))
                .sum();

            if score < stage.threshold {
                return Verdict::Rejected { stage: index };
            }
        }

        Verdict::Face
    }
}

impl FaceDetector for HaarCascade {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>> {
        self.detect_multi_scale(gray, SCALE_FACTOR, MIN_NEIGHBORS)
    }

    fn describe(&self) -> DetectorInfo {
        DetectorInfo {
            kind: "haar-cascade",
            window: self.window,
            stages: self.stages.len(),
            features: self.features.len(),
            scale_factor: SCALE_FACTOR,
            min_neighbors: MIN_NEIGHBORS,
        }
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    elements(node)
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| MoodError::ModelLoad(format!("Cascade is missing <{}>", name)))
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_value<T: FromStr>(node: Node<'_, '_>) -> Result<T> {
    let raw = text(node);
    raw.parse().map_err(|_| {
        MoodError::ModelLoad(format!(
            "Invalid value '{}' in <{}>",
            raw,
            node.tag_name().name()
        ))
    })
}

fn parse_numbers(node: Node<'_, '_>) -> Result<Vec<f64>> {
    text(node)
        .split_whitespace()
        .map(|v| {
            v.parse().map_err(|_| {
                MoodError::ModelLoad(format!(
                    "Invalid number '{}' in <{}>",
                    v,
                    node.tag_name().name()
                ))
            })
        })
        .collect()
}

fn parse_feature(node: Node<'_, '_>, win_w: u32, win_h: u32) -> Result<HaarFeature> {
    if let Some(tilted) = elements(node).find(|n| n.has_tag_name("tilted")) {
        if text(tilted) != "0" {
            return Err(MoodError::ModelLoad(
                "Tilted Haar features are not supported".to_string(),
            ));
        }
    }

    let rects = elements(child(node, "rects")?)
        .map(|r| {
            let values = parse_numbers(r)?;
            if values.len() != 5 || values[..4].iter().any(|v| *v < 0.0) {
                return Err(MoodError::ModelLoad(format!(
                    "Malformed feature rectangle: '{}'",
                    text(r)
                )));
            }

            let rect = HaarRect {
                x: values[0] as u32,
                y: values[1] as u32,
                width: values[2] as u32,
                height: values[3] as u32,
                weight: values[4],
            };

            if rect.x + rect.width > win_w || rect.y + rect.height > win_h {
                return Err(MoodError::ModelLoad(format!(
                    "Feature rectangle '{}' exceeds the {}x{} window",
                    text(r),
                    win_w,
                    win_h
                )));
            }

            Ok(rect)
        })
        .collect::<Result<Vec<_>>>()?;

    if rects.is_empty() || rects.len() > 3 {
        return Err(MoodError::ModelLoad(format!(
            "Haar feature must have 1 to 3 rectangles, got {}",
            rects.len()
        )));
    }

    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node<'_, '_>, feature_count: usize) -> Result<Stage> {
    let threshold = parse_value::<f64>(child(node, "stageThreshold")?)? - THRESHOLD_EPS;

    let classifiers = elements(child(node, "weakClassifiers")?)
        .map(|w| parse_weak_classifier(w, feature_count))
        .collect::<Result<Vec<_>>>()?;

    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node<'_, '_>, feature_count: usize) -> Result<WeakClassifier> {
    let raw_nodes = parse_numbers(child(node, "internalNodes")?)?;
    let leaves = parse_numbers(child(node, "leafValues")?)?;

    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(MoodError::ModelLoad(format!(
            "internalNodes must hold groups of 4 values, got {}",
            raw_nodes.len()
        )));
    }

    let nodes: Vec<TreeNode> = raw_nodes
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    // 子节点索引必须向后，保证遍历终止
    for (idx, n) in nodes.iter().enumerate() {
        if n.feature >= feature_count {
            return Err(MoodError::ModelLoad(format!(
                "Feature index {} out of range ({} features)",
                n.feature, feature_count
            )));
        }

        for next in [n.left, n.right] {
            let valid = if next > 0 {
                (next as usize) > idx && (next as usize) < nodes.len()
            } else {
                (next.unsigned_abs() as usize) < leaves.len()
            };

            if !valid {
                return Err(MoodError::ModelLoad(format!(
                    "Invalid tree reference {} in weak classifier",
                    next
                )));
            }
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// 单级单桩的最小级联
    fn cascade_xml(rects: &str, node: &str, leaves: &str, stage_threshold: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>{stage_threshold}</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            {node}</internalNodes>
          <leafValues>
            {leaves}</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        {rects}</rects></_></features></cascade>
</opencv_storage>
"#
        )
    }

    /// 中心亮、四周暗的窗口得分为正
    fn bright_center_cascade() -> HaarCascade {
        let xml = cascade_xml(
            "<_>0 0 24 24 -1.</_><_>6 6 12 12 4.</_>",
            "0 -1 0 5.0000000000000000e-01",
            "-1. 1.",
            "0.",
        );
        HaarCascade::from_xml(&xml).unwrap()
    }

    fn accept_all_cascade() -> HaarCascade {
        let xml = cascade_xml("<_>0 0 24 24 1.</_>", "0 -1 0 0.", "1. 1.", "-1.");
        HaarCascade::from_xml(&xml).unwrap()
    }

    #[test]
    fn test_integral_image_sums() {
        let image = GrayImage::from_fn(4, 3, |x, y| Luma([(x + 4 * y) as u8]));
        let integral = IntegralImage::new(&image);

        assert_eq!(integral.sum(0, 0, 4, 3), (0..12).sum::<u64>());
        assert_eq!(integral.sum(1, 1, 2, 2), 5 + 6 + 9 + 10);
        assert_eq!(integral.squared_sum(2, 0, 1, 2), 2 * 2 + 6 * 6);
        assert_eq!(integral.sum(3, 2, 0, 0), 0);
    }

    #[test]
    fn test_parses_stump_cascade() {
        let cascade = bright_center_cascade();
        let info = cascade.describe();

        assert_eq!(info.window, (24, 24));
        assert_eq!(info.stages, 1);
        assert_eq!(info.features, 1);
        assert_eq!(info.scale_factor, 1.3);
        assert_eq!(info.min_neighbors, 3);
    }

    #[test]
    fn test_flat_image_has_no_faces() {
        let cascade = bright_center_cascade();
        let white = GrayImage::from_pixel(160, 120, Luma([255]));

        assert!(cascade.detect(&white).unwrap().is_empty());
    }

    #[test]
    fn test_image_smaller_than_window_has_no_faces() {
        let cascade = accept_all_cascade();
        let tiny = GrayImage::from_pixel(10, 10, Luma([128]));

        assert!(cascade.detect(&tiny).unwrap().is_empty());
    }

    #[test]
    fn test_accept_all_cascade_groups_candidates() {
        let cascade = accept_all_cascade();
        let gray = GrayImage::from_pixel(64, 64, Luma([90]));

        let faces = cascade.detect(&gray).unwrap();

        assert!(!faces.is_empty());
        for face in faces {
            assert!(face.x + face.width <= 64 + 1);
            assert!(face.y + face.height <= 64 + 1);
        }
    }

    #[test]
    fn test_bright_square_is_found() {
        let cascade = bright_center_cascade();
        let gray = GrayImage::from_fn(200, 200, |x, y| {
            let inside = (60..108).contains(&x) && (80..128).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        });

        let faces = cascade.detect(&gray).unwrap();

        assert!(!faces.is_empty());
        for face in &faces {
            let overlaps_x = face.x < 108 && face.x + face.width > 60;
            let overlaps_y = face.y < 128 && face.y + face.height > 80;
            assert!(overlaps_x && overlaps_y, "unexpected region {}", face);
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let cascade = bright_center_cascade();
        let gray = GrayImage::from_fn(150, 150, |x, y| Luma([((x * 7 + y * 13) % 256) as u8]));

        assert_eq!(cascade.detect(&gray).unwrap(), cascade.detect(&gray).unwrap());
    }

    #[test]
    fn test_score_just_below_stage_threshold_passes() {
        let xml = cascade_xml("<_>0 0 24 24 1.</_>", "0 -1 0 0.", "0.999995 0.999995", "1.");
        let cascade = HaarCascade::from_xml(&xml).unwrap();
        let gray = GrayImage::from_pixel(64, 64, Luma([90]));

        assert!(!cascade.detect(&gray).unwrap().is_empty());
    }

    #[test]
    fn test_scale_factor_must_grow() {
        let cascade = accept_all_cascade();
        let gray = GrayImage::new(48, 48);

        assert!(cascade.detect_multi_scale(&gray, 1.0, 3).is_err());
    }

    #[test]
    fn test_tilted_features_rejected() {
        let xml = cascade_xml("<_>0 0 24 24 1.</_>", "0 -1 0 0.", "1. 1.", "-1.")
            .replace("</rects></_>", "</rects>\n      <tilted>1</tilted></_>");

        let err = HaarCascade::from_xml(&xml).unwrap_err();
        assert!(err.to_string().contains("Tilted"));
    }

    #[test]
    fn test_out_of_range_leaf_rejected() {
        let xml = cascade_xml("<_>0 0 24 24 1.</_>", "0 -2 0 0.", "1. 1.", "-1.");
        assert!(HaarCascade::from_xml(&xml).is_err());
    }

    #[test]
    fn test_feature_outside_window_rejected() {
        let xml = cascade_xml("<_>10 10 20 20 1.</_>", "0 -1 0 0.", "1. 1.", "-1.");
        assert!(HaarCascade::from_xml(&xml).is_err());
    }

    #[test]
    fn test_non_cascade_document_rejected() {
        let err = HaarCascade::from_xml("<opencv_storage><foo/></opencv_storage>").unwrap_err();
        assert!(matches!(err, MoodError::ModelLoad(_)));
    }

    #[test]
    fn test_missing_file_is_model_load_error() {
        let err = HaarCascade::from_file(Path::new("/nonexistent/cascade.xml")).unwrap_err();
        assert!(matches!(err, MoodError::ModelLoad(_)));
    }
}
