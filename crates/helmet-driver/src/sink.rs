//! 会话事件输出（Sink）
//!
//! 检测会话不直接依赖 UI、持久化或声音播放，所有对外输出都通过
//! [`SessionSink`] 回调发出。[`SinkManager`] 负责扇出到多个 sink。
//!
//! # 调用线程
//!
//! - `on_frame`：视频流线程
//! - `on_detection`：轮询线程
//! - 去抖/报警相关回调：定时器队列线程（严格串行，保证顺序）
//! - 连接状态回调：协调线程
//!
//! 回调应尽快返回；耗时处理请转发到 channel（见 [`ChannelSink`](crate::ChannelSink)）。

use crate::poller::DetectionSample;
use crate::state::ConnectionState;
use crate::stream::DecodedFrame;
use std::sync::Arc;

/// 会话事件回调
///
/// 所有方法都有空的默认实现，按需覆盖即可。
///
/// # 示例
///
/// ```rust
/// use helmet_driver::SessionSink;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// #[derive(Default)]
/// struct AlarmCounter(AtomicU64);
///
/// impl SessionSink for AlarmCounter {
///     fn on_alarm_activated(&self) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait SessionSink: Send + Sync {
    /// 新的显示帧
    fn on_frame(&self, frame: &DecodedFrame) {
        let _ = frame;
    }

    /// 原始检测采样（未去抖）
    fn on_detection(&self, sample: &DetectionSample) {
        let _ = sample;
    }

    /// 去抖后的困倦状态变化
    fn on_drowsy_state_changed(&self, is_drowsy: bool, timestamp_ms: u64) {
        let _ = (is_drowsy, timestamp_ms);
    }

    /// 报警开始
    fn on_alarm_activated(&self) {}

    /// 报警结束
    fn on_alarm_deactivated(&self) {}

    /// 记录一次困倦事件（每次报警最多一次）
    fn log_drowsiness_event(&self, timestamp_ms: u64) {
        let _ = timestamp_ms;
    }

    /// 连接状态变化
    fn on_connection_state_changed(&self, state: ConnectionState) {
        let _ = state;
    }

    /// 握手重试耗尽（每轮握手最多通知一次）
    fn on_connection_failed(&self, detail: &str) {
        let _ = detail;
    }
}

/// Sink 管理器
///
/// 会话构建完成后不再增删 sink，因此不需要锁。
#[derive(Default, Clone)]
pub struct SinkManager {
    sinks: Vec<Arc<dyn SessionSink>>,
}

impl SinkManager {
    #[must_use]
    pub const fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn SessionSink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn SessionSink)) {
        for sink in &self.sinks {
            f(sink.as_ref());
        }
    }
}

impl SessionSink for SinkManager {
    fn on_frame(&self, frame: &DecodedFrame) {
        self.each(|s| s.on_frame(frame));
    }

    fn on_detection(&self, sample: &DetectionSample) {
        self.each(|s| s.on_detection(sample));
    }

    fn on_drowsy_state_changed(&self, is_drowsy: bool, timestamp_ms: u64) {
        self.each(|s| s.on_drowsy_state_changed(is_drowsy, timestamp_ms));
    }

    fn on_alarm_activated(&self) {
        self.each(|s| s.on_alarm_activated());
    }

    fn on_alarm_deactivated(&self) {
        self.each(|s| s.on_alarm_deactivated());
    }

    fn log_drowsiness_event(&self, timestamp_ms: u64) {
        self.each(|s| s.log_drowsiness_event(timestamp_ms));
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        self.each(|s| s.on_connection_state_changed(state));
    }

    fn on_connection_failed(&self, detail: &str) {
        self.each(|s| s.on_connection_failed(detail));
    }
}

impl std::fmt::Debug for SinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkManager")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
