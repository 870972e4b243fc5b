//! `/health` 响应解析
//!
//! 健康判定只看 HTTP 状态码（200 即健康），响应体只做尽力解析，
//! 用于日志和 CLI 展示。

use serde::Deserialize;

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthReport {
    /// `status` 字段（通常是 `"ok"`）
    pub status: Option<String>,
    /// 服务器端模型是否已加载
    pub detector_loaded: Option<bool>,
    /// 服务器端摄像头是否在采集
    pub camera_active: Option<bool>,
    /// 模型路径
    pub model_path: Option<String>,
    /// 原始响应体
    pub raw: String,
}

#[derive(Deserialize)]
struct WireHealth {
    status: Option<String>,
    detector_loaded: Option<bool>,
    camera_active: Option<bool>,
    model_path: Option<String>,
}

impl HealthReport {
    /// 尽力解析响应体；非 JSON 时只保留原文
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<WireHealth>(body) {
            Ok(wire) => Self {
                status: wire.status,
                detector_loaded: wire.detector_loaded,
                camera_active: wire.camera_active,
                model_path: wire.model_path,
                raw: body.to_string(),
            },
            Err(_) => Self {
                raw: body.to_string(),
                ..Self::default()
            },
        }
    }

    /// 服务器已就绪（模型和摄像头都没有报告异常）
    pub fn is_ready(&self) -> bool {
        self.detector_loaded != Some(false) && self.camera_active != Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_health() {
        let body = r#"{"status": "ok", "detector_loaded": true, "camera_active": false, "model_path": "best.pt"}"#;
        let report = HealthReport::from_body(body);
        assert_eq!(report.status.as_deref(), Some("ok"));
        assert_eq!(report.detector_loaded, Some(true));
        assert_eq!(report.camera_active, Some(false));
        assert_eq!(report.model_path.as_deref(), Some("best.pt"));
        assert!(!report.is_ready());
    }

    #[test]
    fn test_plain_text_health() {
        let report = HealthReport::from_body("OK");
        assert_eq!(report.raw, "OK");
        assert!(report.status.is_none());
        assert!(report.is_ready());
    }
}
