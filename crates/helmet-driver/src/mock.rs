//! 内存传输实现
//!
//! 按脚本返回结果，用于在没有检测服务器的情况下测试握手、轮询和视频流。
//! 需要启用 `mock` feature。

use crate::error::DriverError;
use crate::transport::HelmetTransport;
use helmet_protocol::{DetectionReport, DetectionRoute, HealthReport, ServerEndpoint};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// 按脚本返回结果的传输层
///
/// 脚本耗尽后：健康检查返回成功，检测返回"清醒"，视频流返回 EOF。
#[derive(Default)]
pub struct MockTransport {
    health: Mutex<VecDeque<Result<HealthReport, DriverError>>>,
    detect: Mutex<VecDeque<Result<DetectionReport, DriverError>>>,
    streams: Mutex<VecDeque<Result<Box<dyn Read + Send>, DriverError>>>,
    health_hook: Mutex<Option<Hook>>,
    pub health_calls: AtomicUsize,
    pub detect_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub routes: Mutex<Vec<DetectionRoute>>,
    pub endpoints: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_health(&self, result: Result<HealthReport, DriverError>) {
        self.health.lock().push_back(result);
    }

    pub fn push_detect(&self, result: Result<DetectionReport, DriverError>) {
        self.detect.lock().push_back(result);
    }

    pub fn push_stream(&self, result: Result<Box<dyn Read + Send>, DriverError>) {
        self.streams.lock().push_back(result);
    }

    /// 每次健康检查调用时执行（参数为调用序号，从 1 开始）
    pub fn on_health(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.health_hook.lock() = Some(Box::new(hook));
    }

    pub fn refused(url: &str) -> DriverError {
        DriverError::Network {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    }
}

impl HelmetTransport for MockTransport {
    fn health(&self, endpoint: &ServerEndpoint) -> Result<HealthReport, DriverError> {
        let n = self.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.endpoints.lock().push(endpoint.to_string());
        if let Some(hook) = self.health_hook.lock().as_ref() {
            hook(n);
        }
        self.health
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HealthReport::from_body("OK")))
    }

    fn detect(
        &self,
        _endpoint: &ServerEndpoint,
        route: DetectionRoute,
    ) -> Result<DetectionReport, DriverError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.routes.lock().push(route);
        self.detect
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(DetectionReport::default()))
    }

    fn detect_image(
        &self,
        endpoint: &ServerEndpoint,
        _jpeg: &[u8],
    ) -> Result<DetectionReport, DriverError> {
        self.detect(endpoint, DetectionRoute::Full)
    }

    fn open_stream(
        &self,
        _endpoint: &ServerEndpoint,
    ) -> Result<Box<dyn Read + Send>, DriverError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().pop_front() {
            Some(Ok(reader)) => Ok(reader),
            Some(Err(e)) => Err(e),
            None => Ok(Box::new(std::io::empty())),
        }
    }
}

/// 构造一帧：SOI + body_len 个填充字节 + EOI
pub fn fake_jpeg(body_len: usize, fill: u8) -> Vec<u8> {
    let mut frame = vec![0xFF, 0xD8];
    frame.extend(std::iter::repeat_n(fill, body_len));
    frame.extend([0xFF, 0xD9]);
    frame
}
