//! 检测轮询
//!
//! 同一时刻最多只有一个请求在途：上一个请求完成（成功或失败）并且采样已经
//! 同步交给下游之后，才安排下一次轮询。

use crate::clock::{CancelToken, Clock};
use crate::error::DriverError;
use crate::metrics::SessionMetrics;
use crate::transport::HelmetTransport;
use helmet_protocol::{Detection, DetectionReport, DetectionRoute, ServerEndpoint};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 轮询配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// 正常轮询间隔（默认 200ms）
    pub interval: Duration,
    /// 失败后的间隔倍数（默认 2，即失败后 400ms）
    pub error_backoff_factor: u32,
    /// 检测接口（默认 `/detect_simple`）
    pub route: DetectionRoute,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            error_backoff_factor: 2,
            route: DetectionRoute::Simple,
        }
    }
}

impl PollerConfig {
    /// 根据上一次结果计算下一次轮询前的等待时间
    pub fn next_delay(&self, last_ok: bool) -> Duration {
        if last_ok {
            self.interval
        } else {
            self.interval * self.error_backoff_factor.max(1)
        }
    }
}

/// 一次检测采样（不可变，交给状态机后即被消费）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSample {
    /// 原始困倦信号（未去抖）
    pub is_drowsy: bool,
    /// 置信度 [0, 1]
    pub confidence: f32,
    /// 检测目标（保持服务器顺序）
    pub detections: Vec<Detection>,
    /// 采样时间（单调时钟）
    pub observed_at: Instant,
}

impl DetectionSample {
    pub fn from_report(report: DetectionReport, observed_at: Instant) -> Self {
        Self {
            is_drowsy: report.is_drowsy,
            confidence: report.confidence,
            detections: report.detections,
            observed_at,
        }
    }
}

/// 检测轮询器
pub struct DetectionPoller {
    transport: Arc<dyn HelmetTransport>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    metrics: Arc<SessionMetrics>,
}

impl DetectionPoller {
    pub fn new(
        transport: Arc<dyn HelmetTransport>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            transport,
            clock,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// 执行一次检测请求
    ///
    /// 超时、非 200、JSON 错误都作为 `Err` 返回，由调用方决定退避。
    pub fn poll_once(&self, endpoint: &ServerEndpoint) -> Result<DetectionSample, DriverError> {
        let result = self.transport.detect(endpoint, self.config.route);
        self.record(result)
    }

    /// 基于图片的检测（`POST /detect`）
    pub fn detect_image(
        &self,
        endpoint: &ServerEndpoint,
        jpeg: &[u8],
    ) -> Result<DetectionSample, DriverError> {
        let result = self.transport.detect_image(endpoint, jpeg);
        self.record(result)
    }

    fn record(
        &self,
        result: Result<DetectionReport, DriverError>,
    ) -> Result<DetectionSample, DriverError> {
        match result {
            Ok(report) => {
                self.metrics.polls_ok.fetch_add(1, Ordering::Relaxed);
                Ok(DetectionSample::from_report(report, self.clock.now()))
            },
            Err(e) => {
                self.metrics.polls_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            },
        }
    }

    /// 轮询循环，直到 `cancel` 被触发
    ///
    /// - `enabled()` 返回 false 时跳过本轮（不发请求），按正常间隔继续检查
    /// - 成功的采样同步交给 `on_sample`，返回后才开始等待下一轮
    /// - 失败时等待 `interval × error_backoff_factor`
    pub fn run<E, F>(&self, endpoint: &ServerEndpoint, cancel: &CancelToken, enabled: E, mut on_sample: F)
    where
        E: Fn() -> bool,
        F: FnMut(DetectionSample),
    {
        debug!("Detection poller started for {}", endpoint);
        let mut consecutive_failures = 0u32;

        while !cancel.is_cancelled() {
            let delay = if enabled() {
                match self.poll_once(endpoint) {
                    Ok(sample) => {
                        if consecutive_failures > 0 {
                            debug!(
                                "Detection poll recovered after {} failures",
                                consecutive_failures
                            );
                        }
                        consecutive_failures = 0;
                        trace!(
                            "Detection sample: drowsy={} confidence={:.2}",
                            sample.is_drowsy, sample.confidence
                        );
                        if cancel.is_cancelled() {
                            break;
                        }
                        on_sample(sample);
                        self.config.next_delay(true)
                    },
                    Err(e) => {
                        consecutive_failures += 1;
                        // 只在第一次失败时告警，避免服务器掉线时刷屏
                        if consecutive_failures == 1 {
                            warn!("Detection poll against {} failed: {}", endpoint, e);
                        } else {
                            debug!(
                                "Detection poll failed ({} in a row): {}",
                                consecutive_failures, e
                            );
                        }
                        self.config.next_delay(false)
                    },
                }
            } else {
                self.config.interval
            };

            if !self.clock.sleep(delay, cancel) {
                break;
            }
        }

        debug!("Detection poller for {} stopped", endpoint);
    }
}
