//! 检测结果 JSON 解析
//!
//! 服务器返回格式：
//!
//! ```json
//! {"is_drowsy": true, "confidence": 0.91,
//!  "detections": [{"confidence": 0.91, "class_id": 1, "label": "Drowsy",
//!                  "bbox": [12.0, 30.0, 200.0, 180.0]}]}
//! ```
//!
//! 所有字段都是可选的：缺失的 `is_drowsy` 视为 `false`，缺失的 `confidence`
//! 视为 `0.0`，缺失的 `detections` 视为空列表。旧版原型服务器使用
//! `is_eyes_closed` 字段，两者同时出现时以 `is_eyes_closed` 为准。

use crate::ProtocolError;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// 服务器未给出检测框时使用的默认画面尺寸（Pi Camera 640x480）
const DEFAULT_FRAME_WIDTH: f32 = 640.0;
const DEFAULT_FRAME_HEIGHT: f32 = 480.0;

/// 困倦类别 ID
const DROWSY_CLASS_ID: i32 = 1;

/// 检测接口路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionRoute {
    /// `GET /detect_simple`：只返回 `is_drowsy` 和 `confidence`，最快
    #[default]
    Simple,
    /// `GET /detect`：附带完整检测框列表
    Full,
}

impl DetectionRoute {
    /// 请求路径
    pub fn path(self) -> &'static str {
        match self {
            DetectionRoute::Simple => "/detect_simple",
            DetectionRoute::Full => "/detect",
        }
    }
}

/// 检测框（像素坐标，左上角 + 右下角）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// 覆盖整个默认画面的检测框
    pub fn full_frame() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            x2: DEFAULT_FRAME_WIDTH,
            y2: DEFAULT_FRAME_HEIGHT,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// 置信度 [0, 1]
    pub confidence: f32,
    /// 类别 ID（1 = Drowsy，0 = Alert）
    pub class_id: i32,
    /// 类别名称
    pub label: String,
    /// 检测框
    pub bbox: BoundingBox,
}

/// 一次检测请求的解析结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionReport {
    /// 服务器判断的原始困倦信号（未去抖）
    pub is_drowsy: bool,
    /// 置信度，已钳制到 [0, 1]
    pub confidence: f32,
    /// 检测目标列表（保持服务器顺序）
    pub detections: Vec<Detection>,
}

#[derive(Deserialize)]
struct WireReport {
    #[serde(default)]
    is_eyes_closed: Option<bool>,
    #[serde(default)]
    is_drowsy: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    detections: Option<Vec<WireDetection>>,
}

#[derive(Deserialize)]
struct WireDetection {
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    class_id: Option<i64>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    bbox: Option<Vec<f64>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: &'a str,
}

/// 钳制置信度；NaN 视为 0
fn clamp_confidence(value: Option<f64>) -> f32 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0) as f32,
        _ => 0.0,
    }
}

impl DetectionReport {
    /// 从响应体解析
    ///
    /// 当 `is_drowsy == true` 且响应中没有 `detections` 字段时（`/detect_simple`），
    /// 补一个覆盖全画面的 `Drowsy` 目标，保证下游总能拿到至少一个框。
    ///
    /// # Errors
    /// - `ProtocolError::MalformedJson`: 响应体不是合法 JSON 对象
    pub fn from_json(body: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WireReport = serde_json::from_slice(body)?;
        let is_drowsy = wire.is_eyes_closed.or(wire.is_drowsy).unwrap_or(false);
        let confidence = clamp_confidence(wire.confidence);

        let detections = match wire.detections {
            Some(list) => list.into_iter().map(Detection::from_wire).collect(),
            None if is_drowsy => vec![Detection {
                confidence,
                class_id: DROWSY_CLASS_ID,
                label: "Drowsy".to_string(),
                bbox: BoundingBox::full_frame(),
            }],
            None => Vec::new(),
        };

        Ok(Self {
            is_drowsy,
            confidence,
            detections,
        })
    }
}

impl Detection {
    fn from_wire(wire: WireDetection) -> Self {
        let class_id = wire
            .class_id
            .and_then(|id| i32::try_from(id).ok())
            .unwrap_or(0);
        let label = wire.label.unwrap_or_else(|| {
            if class_id == DROWSY_CLASS_ID {
                "Drowsy".to_string()
            } else {
                "Alert".to_string()
            }
        });
        let bbox = match wire.bbox.as_deref() {
            Some([x1, y1, x2, y2, ..]) => BoundingBox {
                x1: *x1 as f32,
                y1: *y1 as f32,
                x2: *x2 as f32,
                y2: *y2 as f32,
            },
            _ => BoundingBox::full_frame(),
        };

        Self {
            confidence: clamp_confidence(wire.confidence),
            class_id,
            label,
            bbox,
        }
    }
}

/// 构造图片检测请求体：`{"image": "<base64 jpeg>"}`
pub fn encode_image_request(jpeg: &[u8]) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
    // 只含一个字符串字段，序列化不会失败
    serde_json::to_vec(&ImageRequest { image: &encoded }).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_response() {
        let report = DetectionReport::from_json(br#"{"is_drowsy": false, "confidence": 0.12}"#)
            .unwrap();
        assert!(!report.is_drowsy);
        assert!((report.confidence - 0.12).abs() < 1e-6);
        assert!(report.detections.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let report = DetectionReport::from_json(b"{}").unwrap();
        assert_eq!(report, DetectionReport::default());
    }

    #[test]
    fn test_drowsy_without_detections_gets_full_frame_box() {
        let report =
            DetectionReport::from_json(br#"{"is_drowsy": true, "confidence": 0.8}"#).unwrap();
        assert_eq!(report.detections.len(), 1);
        let det = &report.detections[0];
        assert_eq!(det.class_id, 1);
        assert_eq!(det.label, "Drowsy");
        assert_eq!(det.bbox, BoundingBox::full_frame());
        assert!((det.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_full_response_keeps_order_and_boxes() {
        let body = br#"{
            "is_drowsy": true,
            "confidence": 0.9,
            "detections": [
                {"confidence": 0.9, "class_id": 1, "label": "Drowsy", "bbox": [1, 2, 3, 4]},
                {"confidence": 0.4, "class_id": 0, "bbox": [5, 6]}
            ]
        }"#;
        let report = DetectionReport::from_json(body).unwrap();
        assert_eq!(report.detections.len(), 2);
        assert_eq!(report.detections[0].bbox.x2, 3.0);
        // 缺省 label 按 class_id 推断；不足 4 个坐标时退回全画面
        assert_eq!(report.detections[1].label, "Alert");
        assert_eq!(report.detections[1].bbox, BoundingBox::full_frame());
    }

    #[test]
    fn test_legacy_eyes_closed_field() {
        let report = DetectionReport::from_json(br#"{"is_eyes_closed": true}"#).unwrap();
        assert!(report.is_drowsy);
        let report =
            DetectionReport::from_json(br#"{"is_eyes_closed": false, "is_drowsy": true}"#)
                .unwrap();
        assert!(!report.is_drowsy);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let report = DetectionReport::from_json(br#"{"confidence": 7.5}"#).unwrap();
        assert_eq!(report.confidence, 1.0);
        let report = DetectionReport::from_json(br#"{"confidence": -2}"#).unwrap();
        assert_eq!(report.confidence, 0.0);
    }

    #[test]
    fn test_malformed_json_is_protocol_error() {
        let err = DetectionReport::from_json(b"<html>500</html>").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedJson(_)));
    }

    #[test]
    fn test_wrong_type_is_protocol_error() {
        assert!(DetectionReport::from_json(br#"{"is_drowsy": "yes"}"#).is_err());
    }

    #[test]
    fn test_route_paths() {
        assert_eq!(DetectionRoute::Simple.path(), "/detect_simple");
        assert_eq!(DetectionRoute::Full.path(), "/detect");
        assert_eq!(DetectionRoute::default(), DetectionRoute::Simple);
    }

    #[test]
    fn test_encode_image_request() {
        let body = encode_image_request(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["image"], "/9j/2Q==");
    }
}
