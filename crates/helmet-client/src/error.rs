//! 会话层错误类型

use helmet_driver::DriverError;
use helmet_protocol::ProtocolError;
use helmet_tools::ConfigError;
use thiserror::Error;

/// 会话层错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 服务器地址为空或非法（不会重试）
    #[error("Invalid server endpoint: {0}")]
    InvalidEndpoint(#[from] ProtocolError),

    /// 地址持久化失败
    #[error("Failed to persist endpoint: {0}")]
    Persist(#[from] ConfigError),

    /// 驱动层错误（线程创建失败等）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 协调线程未在限定时间内响应
    #[error("Session coordinator did not respond to {0}")]
    Timeout(&'static str),

    /// 会话已关闭
    #[error("Session has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err: SessionError = ProtocolError::EmptyEndpoint.into();
        assert!(matches!(err, SessionError::InvalidEndpoint(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_timeout_display() {
        let err = SessionError::Timeout("stop");
        assert_eq!(err.to_string(), "Session coordinator did not respond to stop");
    }
}
