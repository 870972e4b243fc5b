//! 基于 Channel 的事件 sink
//!
//! 把 [`SessionSink`] 回调转换成 [`SessionEvent`] 消息，交给其他线程
//! （例如 CLI 主循环）处理。
//!
//! - **有界队列**：防止消费者停滞时内存无限增长
//! - **非阻塞**：使用 `try_send`，队列满时丢事件而不是阻塞会话线程
//! - **丢弃计数**：`dropped_events()` 用于监控
//!
//! # 使用示例
//!
//! ```rust
//! use helmet_driver::{ChannelSink, SessionEvent, SessionSink};
//!
//! let (sink, rx) = ChannelSink::new(64);
//! sink.on_alarm_activated();
//! assert!(matches!(rx.try_recv(), Ok(SessionEvent::AlarmActivated)));
//! ```

use crate::poller::DetectionSample;
use crate::sink::SessionSink;
use crate::state::ConnectionState;
use crate::stream::DecodedFrame;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话事件
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame(DecodedFrame),
    Detection(DetectionSample),
    DrowsyStateChanged { is_drowsy: bool, timestamp_ms: u64 },
    AlarmActivated,
    AlarmDeactivated,
    DrowsinessEventLogged { timestamp_ms: u64 },
    ConnectionStateChanged(ConnectionState),
    ConnectionFailed(String),
}

/// Channel sink
pub struct ChannelSink {
    tx: Sender<SessionEvent>,
    dropped_events: Arc<AtomicU64>,
    forward_frames: bool,
}

impl ChannelSink {
    /// 创建 sink（转发所有事件，包括视频帧）
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
            forward_frames: true,
        };
        (sink, rx)
    }

    /// 不转发视频帧（只关心状态事件时，避免帧挤占队列）
    #[must_use]
    pub fn without_frames(mut self) -> Self {
        self.forward_frames = false;
        self
    }

    /// 丢弃计数器
    pub fn dropped_events(&self) -> &Arc<AtomicU64> {
        &self.dropped_events
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl SessionSink for ChannelSink {
    fn on_frame(&self, frame: &DecodedFrame) {
        if self.forward_frames {
            self.send(SessionEvent::Frame(frame.clone()));
        }
    }

    fn on_detection(&self, sample: &DetectionSample) {
        self.send(SessionEvent::Detection(sample.clone()));
    }

    fn on_drowsy_state_changed(&self, is_drowsy: bool, timestamp_ms: u64) {
        self.send(SessionEvent::DrowsyStateChanged {
            is_drowsy,
            timestamp_ms,
        });
    }

    fn on_alarm_activated(&self) {
        self.send(SessionEvent::AlarmActivated);
    }

    fn on_alarm_deactivated(&self) {
        self.send(SessionEvent::AlarmDeactivated);
    }

    fn log_drowsiness_event(&self, timestamp_ms: u64) {
        self.send(SessionEvent::DrowsinessEventLogged { timestamp_ms });
    }

    fn on_connection_state_changed(&self, state: ConnectionState) {
        self.send(SessionEvent::ConnectionStateChanged(state));
    }

    fn on_connection_failed(&self, detail: &str) {
        self.send(SessionEvent::ConnectionFailed(detail.to_string()));
    }
}
