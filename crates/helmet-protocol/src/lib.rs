//! 协议层模块
//!
//! 本模块描述手机端与树莓派检测服务器之间的所有线上格式：
//! - 服务器地址规范化（[`ServerEndpoint`]）
//! - `/health` 响应解析（[`HealthReport`]）
//! - `/detect`、`/detect_simple` JSON 解析（[`DetectionReport`]）
//! - `/stream` MJPEG 字节流切帧（[`MjpegDecoder`]）
//!
//! 本 crate 不做任何 IO，全部是纯函数/纯状态机，方便在驱动层之外单独测试。

pub mod detection;
pub mod endpoint;
pub mod health;
pub mod mjpeg;

pub use detection::{
    BoundingBox, Detection, DetectionReport, DetectionRoute, encode_image_request,
};
pub use endpoint::{DEFAULT_ENDPOINT, ServerEndpoint};
pub use health::HealthReport;
pub use mjpeg::{DecoderStats, Frames, MIN_FRAME_LEN, MjpegDecoder, StreamFrame};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 服务器地址为空
    #[error("Server endpoint is empty")]
    EmptyEndpoint,

    /// 服务器地址格式非法
    #[error("Invalid server endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: &'static str },

    /// JSON 解析失败
    #[error("Malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// 字段值非法
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
