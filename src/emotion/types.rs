use crate::models::Emotion;
use serde::Serialize;
use std::fmt;

/// 检测到的人脸矩形（图像坐标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for FaceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// 情绪预测结果，字段名是对外接口的一部分
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoodPrediction {
    pub mood: u8,
    #[serde(rename = "moodLabel")]
    pub mood_label: &'static str,
}

impl From<Emotion> for MoodPrediction {
    fn from(emotion: Emotion) -> Self {
        Self {
            mood: emotion.index(),
            mood_label: emotion.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_wire_format() {
        let prediction = MoodPrediction::from(Emotion::Happy);
        let json = serde_json::to_value(&prediction).unwrap();

        assert_eq!(json, serde_json::json!({ "mood": 3, "moodLabel": "Happy" }));
    }

    #[test]
    fn test_region_display() {
        let region = FaceRegion::new(4, 9, 30, 31);
        assert_eq!(region.to_string(), "30x31+4+9");
        assert_eq!(region.area(), 930);
    }
}
