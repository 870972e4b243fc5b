//! 驱动层错误类型定义

use helmet_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// 错误分类
///
/// 每个网络/解码调用的失败都会被归入其中一类，由调用方按类别决定策略：
///
/// | 类别 | 策略 |
/// |------|------|
/// | `TransientNetwork` | 按组件策略重试（握手有限重试、轮询退避、视频流定时重连） |
/// | `Protocol` | 记录日志，视为一次失败的采样/尝试 |
/// | `Decode` | 计数并丢帧，连续失败超过阈值才触发重连 |
/// | `FatalConfiguration` | 立即上报，不重试 |
/// | `Cancelled` | 会话停止或重新配置，静默退出 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientNetwork,
    Protocol,
    Decode,
    FatalConfiguration,
    Cancelled,
}

impl ErrorKind {
    /// 是否值得重试
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork | ErrorKind::Protocol | ErrorKind::Decode
        )
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 服务器返回了非 200 状态码
    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// 网络错误（连接被拒绝、DNS 失败、连接重置等）
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// 请求超时
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// 单次握手等待超过上限（传输层没有按时返回）
    #[error("Attempt did not complete within {0:?}")]
    AttemptTimeout(Duration),

    /// 请求地址无法解析为合法 URL
    #[error("Invalid request URL '{0}'")]
    InvalidUrl(String),

    /// 视频流读到 EOF
    #[error("Stream closed by server")]
    StreamClosed,

    /// JPEG 解码失败
    #[error("Frame decode failed: {0}")]
    Decode(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 工作线程异常退出
    #[error("Worker thread error: {0}")]
    Worker(String),

    /// 操作被取消
    #[error("Operation cancelled")]
    Cancelled,
}

impl DriverError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Protocol(
                ProtocolError::EmptyEndpoint | ProtocolError::InvalidEndpoint { .. },
            ) => ErrorKind::FatalConfiguration,
            DriverError::Protocol(_) | DriverError::HttpStatus { .. } => ErrorKind::Protocol,
            DriverError::Network { .. }
            | DriverError::Timeout { .. }
            | DriverError::AttemptTimeout(_)
            | DriverError::StreamClosed
            | DriverError::Io(_)
            | DriverError::Worker(_) => ErrorKind::TransientNetwork,
            DriverError::InvalidUrl(_) => ErrorKind::FatalConfiguration,
            DriverError::Decode(_) => ErrorKind::Decode,
            DriverError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 是否为致命配置错误
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::FatalConfiguration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::HttpStatus {
            url: "http://pi/health".to_string(),
            status: 503,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503") && msg.contains("http://pi/health"));

        let err = DriverError::Timeout {
            url: "http://pi/detect_simple".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Request to http://pi/detect_simple timed out"
        );

        assert_eq!(format!("{}", DriverError::Cancelled), "Operation cancelled");
        assert_eq!(
            format!("{}", DriverError::StreamClosed),
            "Stream closed by server"
        );
    }

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            DriverError::Network {
                url: String::new(),
                message: "refused".to_string()
            }
            .kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            DriverError::HttpStatus {
                url: String::new(),
                status: 500
            }
            .kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            DriverError::Decode("bad huffman".to_string()).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            DriverError::InvalidUrl("http://".to_string()).kind(),
            ErrorKind::FatalConfiguration
        );
        assert!(DriverError::Protocol(ProtocolError::EmptyEndpoint).is_fatal());
        assert!(!DriverError::Cancelled.kind().is_retryable());
        assert!(ErrorKind::Decode.is_retryable());
    }

    #[test]
    fn test_from_protocol_error() {
        let protocol_error = helmet_protocol::DetectionReport::from_json(b"{").unwrap_err();
        let err: DriverError = protocol_error.into();
        match err {
            DriverError::Protocol(ProtocolError::MalformedJson(_)) => {},
            other => panic!("Expected Protocol variant, got {:?}", other),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: DriverError = io.into();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    }
}
