//! 服务器地址规范化
//!
//! 用户输入的地址经常是 `192.168.43.151:5000` 或带结尾斜杠的 URL，
//! 这里统一成 `http://host:port` 形式，所有请求路径都基于它拼接。

use crate::ProtocolError;
use std::fmt;

/// 默认树莓派检测服务器地址（热点网段）
pub const DEFAULT_ENDPOINT: &str = "http://192.168.43.151:5000";

/// 规范化后的服务器基础地址
///
/// 不变量：
/// - 一定以 `http://` 或 `https://` 开头
/// - 不以 `/` 结尾
/// - host 部分非空，且整体不含空白字符
///
/// # Example
///
/// ```
/// use helmet_protocol::ServerEndpoint;
///
/// let ep = ServerEndpoint::parse("192.168.1.20:5000/").unwrap();
/// assert_eq!(ep.as_str(), "http://192.168.1.20:5000");
/// assert_eq!(ep.health_url(), "http://192.168.1.20:5000/health");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerEndpoint(String);

impl ServerEndpoint {
    /// 解析并规范化用户输入
    ///
    /// # Errors
    /// - `ProtocolError::EmptyEndpoint`: 输入为空或全是空白
    /// - `ProtocolError::InvalidEndpoint`: 缺少 host 或包含空白
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyEndpoint);
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(ProtocolError::InvalidEndpoint {
                input: raw.to_string(),
                reason: "contains whitespace",
            });
        }

        let mut url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        while url.ends_with('/') {
            url.pop();
        }

        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() || host.starts_with(':') {
            return Err(ProtocolError::InvalidEndpoint {
                input: raw.to_string(),
                reason: "missing host",
            });
        }

        Ok(Self(url))
    }

    /// 规范化后的基础地址
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 拼接请求路径（`path` 需以 `/` 开头）
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }

    /// `GET /health`
    pub fn health_url(&self) -> String {
        self.join("/health")
    }

    /// `GET /stream`（MJPEG）
    pub fn stream_url(&self) -> String {
        self.join("/stream")
    }
}

impl Default for ServerEndpoint {
    fn default() -> Self {
        Self(DEFAULT_ENDPOINT.to_string())
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ServerEndpoint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_prepended() {
        let ep = ServerEndpoint::parse("10.0.0.5:5000").unwrap();
        assert_eq!(ep.as_str(), "http://10.0.0.5:5000");
    }

    #[test]
    fn test_existing_scheme_is_kept() {
        let ep = ServerEndpoint::parse("https://pi.local").unwrap();
        assert_eq!(ep.as_str(), "https://pi.local");
    }

    #[test]
    fn test_trailing_slash_is_stripped() {
        let ep = ServerEndpoint::parse("  http://pi.local:5000//  ").unwrap();
        assert_eq!(ep.as_str(), "http://pi.local:5000");
        assert_eq!(ep.stream_url(), "http://pi.local:5000/stream");
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(matches!(
            ServerEndpoint::parse("   "),
            Err(ProtocolError::EmptyEndpoint)
        ));
    }

    #[test]
    fn test_missing_host_is_rejected() {
        assert!(matches!(
            ServerEndpoint::parse("http://"),
            Err(ProtocolError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            ServerEndpoint::parse(":5000"),
            Err(ProtocolError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_whitespace_inside_is_rejected() {
        assert!(ServerEndpoint::parse("http://pi local:5000").is_err());
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(ServerEndpoint::default().as_str(), DEFAULT_ENDPOINT);
        // 默认地址本身必须是规范形式
        assert_eq!(
            ServerEndpoint::parse(DEFAULT_ENDPOINT).unwrap(),
            ServerEndpoint::default()
        );
    }
}
