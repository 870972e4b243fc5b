//! HTTP 传输层
//!
//! [`HelmetTransport`] 把检测服务器的四个接口抽象成阻塞调用，
//! 上层（握手、轮询、视频流）只依赖该 trait，测试中可以替换为内存实现。

use crate::error::DriverError;
use helmet_protocol::{
    DetectionReport, DetectionRoute, HealthReport, ServerEndpoint, encode_image_request,
};
use std::io::Read;
use std::time::Duration;
use tracing::trace;

/// 检测服务器传输接口
///
/// 所有方法都是阻塞的，必须在工作线程中调用。
pub trait HelmetTransport: Send + Sync {
    /// `GET {endpoint}/health`，200 即健康
    fn health(&self, endpoint: &ServerEndpoint) -> Result<HealthReport, DriverError>;

    /// `GET {endpoint}/detect_simple` 或 `GET {endpoint}/detect`
    fn detect(
        &self,
        endpoint: &ServerEndpoint,
        route: DetectionRoute,
    ) -> Result<DetectionReport, DriverError>;

    /// `POST {endpoint}/detect`，请求体为 `{"image": base64(jpeg)}`
    fn detect_image(
        &self,
        endpoint: &ServerEndpoint,
        jpeg: &[u8],
    ) -> Result<DetectionReport, DriverError>;

    /// `GET {endpoint}/stream`，返回响应体读取器
    ///
    /// 非 200 状态码返回 `DriverError::HttpStatus`。读取器会被移交给独立的读线程。
    fn open_stream(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn Read + Send>, DriverError>;
}

/// 传输层超时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// 健康检查整体超时（默认 3s）
    pub health_timeout: Duration,
    /// 建立 TCP 连接超时（默认 5s）
    pub connect_timeout: Duration,
    /// 检测请求整体超时、视频流等待响应头超时（默认 10s）
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// 基于 `ureq` 的传输实现
///
/// 三类请求使用三个独立的 agent，避免长连接的视频流占用检测请求的连接池，
/// 也让各自的超时互不影响。状态码不当作错误（`http_status_as_error(false)`），
/// 统一在本层检查。
pub struct UreqTransport {
    health: ureq::Agent,
    detect: ureq::Agent,
    stream: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        let health: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout.min(config.health_timeout)))
            .timeout_global(Some(config.health_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let detect: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout))
            .timeout_global(Some(config.read_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        // 视频流是长连接，不能设置整体超时；响应体的空闲超时由 StreamPump 负责
        let stream: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(config.connect_timeout))
            .timeout_recv_response(Some(config.read_timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            health,
            detect,
            stream,
        }
    }

    fn check_status(url: &str, status: u16) -> Result<(), DriverError> {
        if status == 200 {
            Ok(())
        } else {
            Err(DriverError::HttpStatus {
                url: url.to_string(),
                status,
            })
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

/// 把 `ureq` 错误映射到驱动层错误
fn map_ureq_error(url: &str, err: ureq::Error) -> DriverError {
    match err {
        ureq::Error::BadUri(_) => DriverError::InvalidUrl(url.to_string()),
        ureq::Error::Timeout(_) => DriverError::Timeout {
            url: url.to_string(),
        },
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => DriverError::Timeout {
            url: url.to_string(),
        },
        other => DriverError::Network {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}

impl HelmetTransport for UreqTransport {
    fn health(&self, endpoint: &ServerEndpoint) -> Result<HealthReport, DriverError> {
        let url = endpoint.health_url();
        trace!("GET {}", url);
        let mut response = self
            .health
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, e))?;
        Self::check_status(&url, response.status().as_u16())?;

        // 健康判定只看状态码，响应体读取失败不影响结果
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Ok(HealthReport::from_body(&body))
    }

    fn detect(
        &self,
        endpoint: &ServerEndpoint,
        route: DetectionRoute,
    ) -> Result<DetectionReport, DriverError> {
        let url = endpoint.join(route.path());
        trace!("GET {}", url);
        let mut response = self
            .detect
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, e))?;
        Self::check_status(&url, response.status().as_u16())?;

        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, e))?;
        Ok(DetectionReport::from_json(&body)?)
    }

    fn detect_image(
        &self,
        endpoint: &ServerEndpoint,
        jpeg: &[u8],
    ) -> Result<DetectionReport, DriverError> {
        let url = endpoint.join(DetectionRoute::Full.path());
        let payload = encode_image_request(jpeg);
        trace!("POST {} ({} bytes)", url, payload.len());
        let mut response = self
            .detect
            .post(&url)
            .header("Content-Type", "application/json")
            .send(&payload[..])
            .map_err(|e| map_ureq_error(&url, e))?;
        Self::check_status(&url, response.status().as_u16())?;

        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| map_ureq_error(&url, e))?;
        Ok(DetectionReport::from_json(&body)?)
    }

    fn open_stream(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn Read + Send>, DriverError> {
        let url = endpoint.stream_url();
        trace!("GET {} (stream)", url);
        let response = self
            .stream
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, e))?;
        Self::check_status(&url, response.status().as_u16())?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}
