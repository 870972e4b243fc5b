//! 会话指标模块
//!
//! 提供零开销的原子计数器，用于监控握手、轮询和视频流链路的健康状态。
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 会话实时指标
///
/// # 使用示例
///
/// ```rust
/// use helmet_driver::SessionMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(SessionMetrics::default());
///
/// // 在轮询线程中更新指标
/// metrics.polls_ok.fetch_add(1, Ordering::Relaxed);
///
/// // 在主线程中读取快照
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.polls_ok, 1);
/// ```
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 健康检查尝试次数（不含被围栏丢弃的尝试）
    pub connect_attempts: AtomicU64,

    /// 成功的检测轮询次数
    pub polls_ok: AtomicU64,

    /// 失败的检测轮询次数（超时、非 200、JSON 错误）
    pub polls_failed: AtomicU64,

    /// 解码器切出的完整帧数
    pub frames_received: AtomicU64,

    /// 交给显示 sink 的帧数
    pub frames_displayed: AtomicU64,

    /// 因限速被丢弃的帧数
    ///
    /// 正常现象：服务器推流帧率远高于显示帧率。
    pub frames_rate_limited: AtomicU64,

    /// JPEG 解码失败次数
    pub frames_decode_failed: AtomicU64,

    /// 视频流重连次数
    pub stream_reconnects: AtomicU64,

    /// 报警触发次数
    pub alarms_activated: AtomicU64,
}

impl SessionMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_displayed: self.frames_displayed.load(Ordering::Relaxed),
            frames_rate_limited: self.frames_rate_limited.load(Ordering::Relaxed),
            frames_decode_failed: self.frames_decode_failed.load(Ordering::Relaxed),
            stream_reconnects: self.stream_reconnects.load(Ordering::Relaxed),
            alarms_activated: self.alarms_activated.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.connect_attempts.store(0, Ordering::Relaxed);
        self.polls_ok.store(0, Ordering::Relaxed);
        self.polls_failed.store(0, Ordering::Relaxed);
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_displayed.store(0, Ordering::Relaxed);
        self.frames_rate_limited.store(0, Ordering::Relaxed);
        self.frames_decode_failed.store(0, Ordering::Relaxed);
        self.stream_reconnects.store(0, Ordering::Relaxed);
        self.alarms_activated.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub frames_received: u64,
    pub frames_displayed: u64,
    pub frames_rate_limited: u64,
    pub frames_decode_failed: u64,
    pub stream_reconnects: u64,
    pub alarms_activated: u64,
}

impl MetricsSnapshot {
    /// 轮询成功率（百分比）
    ///
    /// 返回 0.0 到 100.0 之间的值。没有任何轮询时返回 0.0。
    pub fn poll_success_rate(&self) -> f64 {
        let total = self.polls_ok + self.polls_failed;
        if total == 0 {
            return 0.0;
        }
        (self.polls_ok as f64 / total as f64) * 100.0
    }

    /// 显示帧占切出帧的比例（百分比）
    pub fn display_ratio(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.frames_displayed as f64 / self.frames_received as f64) * 100.0
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "polls {}/{} ok ({:.1}%), frames {} displayed / {} received ({} rate-limited, {} decode errors), {} stream reconnects, {} connect attempts, {} alarms",
            self.polls_ok,
            self.polls_ok + self.polls_failed,
            self.poll_success_rate(),
            self.frames_displayed,
            self.frames_received,
            self.frames_rate_limited,
            self.frames_decode_failed,
            self.stream_reconnects,
            self.connect_attempts,
            self.alarms_activated,
        )
    }
}
