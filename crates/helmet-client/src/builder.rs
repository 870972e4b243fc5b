//! Builder 模式实现
//!
//! 提供链式构造 [`HelmetSession`] 的便捷方式。

use crate::actuator::{AlarmActuator, LatchedActuator, NullActuator};
use crate::config::{EndpointStore, SessionConfig};
use crate::error::SessionError;
use crate::recorder::StatusRecorder;
use crate::session::{HelmetSession, SessionParts};
use helmet_driver::{
    Clock, FrameCodec, HelmetTransport, JpegCodec, SessionSink, SinkManager, SystemClock,
    UreqTransport,
};
use helmet_protocol::{DEFAULT_ENDPOINT, ServerEndpoint};
use helmet_tools::EventLog;
use std::sync::Arc;

/// 会话 Builder（链式构造）
///
/// 未指定的组件使用默认实现：`ureq` 传输、系统时钟、`image` JPEG 解码、
/// 无声执行器，服务器地址默认为 [`DEFAULT_ENDPOINT`]。
///
/// # Example
///
/// ```no_run
/// use helmet_client::{SessionBuilder, SessionConfig};
/// use helmet_driver::ChannelSink;
/// use std::sync::Arc;
///
/// let (sink, events) = ChannelSink::new(256);
/// let session = SessionBuilder::new()
///     .endpoint("192.168.43.151:5000")
///     .config(SessionConfig::default())
///     .sink(Arc::new(sink))
///     .build()
///     .unwrap();
/// ```
pub struct SessionBuilder {
    endpoint: Option<String>,
    config: SessionConfig,
    transport: Option<Arc<dyn HelmetTransport>>,
    clock: Option<Arc<dyn Clock>>,
    codec: Option<Arc<dyn FrameCodec>>,
    actuator: Option<Arc<dyn AlarmActuator>>,
    endpoint_store: Option<Arc<dyn EndpointStore>>,
    sinks: SinkManager,
    surface_active: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: None,
            config: SessionConfig::default(),
            transport: None,
            clock: None,
            codec: None,
            actuator: None,
            endpoint_store: None,
            sinks: SinkManager::new(),
            surface_active: true,
        }
    }

    /// 服务器地址（可省略 `http://`）
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// 自定义传输层（测试或代理场景）
    pub fn transport(mut self, transport: Arc<dyn HelmetTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// 报警执行器（声音 + 振动）
    pub fn actuator(mut self, actuator: Arc<dyn AlarmActuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// `set_endpoint(.., persist = true, ..)` 时写入的存储
    pub fn endpoint_store(mut self, store: Arc<dyn EndpointStore>) -> Self {
        self.endpoint_store = Some(store);
        self
    }

    /// 追加事件 sink（可多次调用）
    pub fn sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sinks.add_sink(sink);
        self
    }

    /// 把报警事件记录到状态日志
    pub fn event_log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.sinks.add_sink(Arc::new(StatusRecorder::new(log)));
        self
    }

    /// 初始是否有显示画面（默认有，连接后立即拉视频流）
    pub fn surface_active(mut self, active: bool) -> Self {
        self.surface_active = active;
        self
    }

    /// 构建会话并启动协调线程和定时器线程（不会自动连接）
    pub fn build(self) -> Result<HelmetSession, SessionError> {
        let endpoint =
            ServerEndpoint::parse(self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT))?;
        let config = self.config;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new(config.transport)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let codec = self.codec.unwrap_or_else(|| Arc::new(JpegCodec));
        let actuator = self.actuator.unwrap_or_else(|| Arc::new(NullActuator));

        HelmetSession::spawn(SessionParts {
            endpoint,
            config,
            transport,
            clock,
            codec,
            actuator: Arc::new(LatchedActuator::new(actuator)),
            endpoint_store: self.endpoint_store,
            sinks: self.sinks,
            surface_active: self.surface_active,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmet_driver::ConnectionState;
    use helmet_driver::mock::MockTransport;

    #[test]
    fn test_default_endpoint() {
        let session = SessionBuilder::new()
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();
        assert_eq!(session.endpoint().as_str(), DEFAULT_ENDPOINT);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = SessionBuilder::new()
            .endpoint("")
            .transport(Arc::new(MockTransport::new()))
            .build();
        assert!(matches!(result, Err(SessionError::InvalidEndpoint(_))));
    }
}
