//! 健康检查握手（有限重试 + 地址围栏）
//!
//! 握手流程：
//!
//! 1. 派发前检查目标地址是否仍是当前配置的地址
//! 2. 在独立线程上执行 `GET /health`，最多等待 `attempt_timeout`
//!    （与传输层超时无关，保证重试循环不会被卡住的回调拖死）
//! 3. 返回后再次检查地址；地址已变化则放弃本次握手，不占用重试次数，也不改动任何共享状态
//! 4. 失败时等待 `retry_delay` 后重试，最多 `max_attempts` 次
//!
//! 所有等待都经过 [`Clock`]，可被 [`CancelToken`] 立即打断。

use crate::clock::{CancelToken, Clock};
use crate::error::{DriverError, ErrorKind};
use crate::metrics::SessionMetrics;
use crate::thread::spawn_named;
use crate::transport::HelmetTransport;
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, select};
use helmet_protocol::{HealthReport, ServerEndpoint};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 握手重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（默认 5）
    pub max_attempts: u32,
    /// 两次尝试之间的间隔（默认 2000ms）
    pub retry_delay: Duration,
    /// 单次尝试的等待上限（默认 3000ms）
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(2000),
            attempt_timeout: Duration::from_millis(3000),
        }
    }
}

/// 握手结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// 服务器健康
    Connected,
    /// 重试耗尽或遇到致命配置错误
    Failed,
    /// 目标地址已被新配置取代，本次握手作废
    Superseded,
    /// 被取消（stop）
    Cancelled,
}

/// 握手结果
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub outcome: ConnectOutcome,
    /// 本次握手针对的地址
    pub endpoint: ServerEndpoint,
    /// 实际计入的尝试次数（被围栏丢弃的尝试不计入）
    pub attempts: u32,
    /// 可读的结果描述（失败时用于通知用户）
    pub detail: String,
    /// 成功时的健康检查响应
    pub health: Option<HealthReport>,
}

impl ConnectionResult {
    pub fn success(&self) -> bool {
        self.outcome == ConnectOutcome::Connected
    }

    fn new(outcome: ConnectOutcome, endpoint: &ServerEndpoint, attempts: u32, detail: String) -> Self {
        Self {
            outcome,
            endpoint: endpoint.clone(),
            attempts,
            detail,
            health: None,
        }
    }
}

/// 健康检查客户端
pub struct HealthClient {
    transport: Arc<dyn HelmetTransport>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SessionMetrics>,
}

impl HealthClient {
    pub fn new(
        transport: Arc<dyn HelmetTransport>,
        clock: Arc<dyn Clock>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            transport,
            clock,
            metrics,
        }
    }

    /// 对 `endpoint` 执行有限重试握手
    ///
    /// `live` 是当前配置的地址；任何时候发现它与 `endpoint` 不一致，
    /// 立即返回 [`ConnectOutcome::Superseded`]。
    pub fn attempt_connect(
        &self,
        endpoint: &ServerEndpoint,
        live: &ArcSwap<ServerEndpoint>,
        policy: &RetryPolicy,
        cancel: &CancelToken,
    ) -> ConnectionResult {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut last_error: Option<DriverError> = None;

        while attempts < max_attempts {
            if cancel.is_cancelled() {
                return Self::cancelled(endpoint, attempts);
            }
            if !Self::is_live(endpoint, live) {
                return Self::superseded(endpoint, live.load().as_ref(), attempts);
            }

            debug!(
                "Health check attempt {}/{} against {}",
                attempts + 1,
                max_attempts,
                endpoint
            );
            let result = self.single_attempt(endpoint, policy.attempt_timeout, cancel);

            if cancel.is_cancelled() {
                return Self::cancelled(endpoint, attempts);
            }
            if !Self::is_live(endpoint, live) {
                // 往返期间地址被修改：丢弃结果，不计入重试次数
                return Self::superseded(endpoint, live.load().as_ref(), attempts);
            }

            attempts += 1;
            self.metrics
                .connect_attempts
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            match result {
                Ok(report) => {
                    info!("Connected to detection server at {}", endpoint);
                    let mut connected = ConnectionResult::new(
                        ConnectOutcome::Connected,
                        endpoint,
                        attempts,
                        format!("Connected to {}", endpoint),
                    );
                    connected.health = Some(report);
                    return connected;
                },
                Err(e) if e.kind() == ErrorKind::FatalConfiguration => {
                    warn!("Health check against {} failed permanently: {}", endpoint, e);
                    return ConnectionResult::new(
                        ConnectOutcome::Failed,
                        endpoint,
                        attempts,
                        format!("Invalid server address {}: {}", endpoint, e),
                    );
                },
                Err(DriverError::Cancelled) => return Self::cancelled(endpoint, attempts),
                Err(e) => {
                    warn!(
                        "Health check attempt {}/{} against {} failed: {}",
                        attempts, max_attempts, endpoint, e
                    );
                    last_error = Some(e);
                },
            }

            if attempts < max_attempts && !self.clock.sleep(policy.retry_delay, cancel) {
                return Self::cancelled(endpoint, attempts);
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no response".to_string());
        ConnectionResult::new(
            ConnectOutcome::Failed,
            endpoint,
            attempts,
            format!(
                "Could not reach detection server at {} after {} attempts: {}",
                endpoint, attempts, reason
            ),
        )
    }

    /// 单次健康检查，最多等待 `cap`
    ///
    /// 请求在独立线程上执行；超时后该线程由传输层超时负责收尾，结果被丢弃。
    fn single_attempt(
        &self,
        endpoint: &ServerEndpoint,
        cap: Duration,
        cancel: &CancelToken,
    ) -> Result<HealthReport, DriverError> {
        let (tx, rx) = bounded(1);
        let transport = Arc::clone(&self.transport);
        let target = endpoint.clone();
        spawn_named("helmet-connect", move || {
            let _ = tx.send(transport.health(&target));
        })?;

        select! {
            recv(rx) -> msg => msg.unwrap_or_else(|_| {
                Err(DriverError::Worker("health worker exited without a result".to_string()))
            }),
            recv(cancel.receiver()) -> _ => Err(DriverError::Cancelled),
            default(cap) => Err(DriverError::AttemptTimeout(cap)),
        }
    }

    fn is_live(endpoint: &ServerEndpoint, live: &ArcSwap<ServerEndpoint>) -> bool {
        live.load().as_ref() == endpoint
    }

    fn cancelled(endpoint: &ServerEndpoint, attempts: u32) -> ConnectionResult {
        debug!("Connect to {} cancelled", endpoint);
        ConnectionResult::new(
            ConnectOutcome::Cancelled,
            endpoint,
            attempts,
            "Connect cancelled".to_string(),
        )
    }

    fn superseded(
        endpoint: &ServerEndpoint,
        replacement: &ServerEndpoint,
        attempts: u32,
    ) -> ConnectionResult {
        debug!("Connect to {} superseded by {}", endpoint, replacement);
        ConnectionResult::new(
            ConnectOutcome::Superseded,
            endpoint,
            attempts,
            format!(
                "Endpoint {} was replaced by {} during connect",
                endpoint, replacement
            ),
        )
    }
}
