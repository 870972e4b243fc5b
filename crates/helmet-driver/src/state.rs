//! 连接状态定义
//!
//! `ConnectionState` 只由会话协调线程写入，轮询线程和视频流线程只读。

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 与检测服务器的连接状态
///
/// # 状态迁移
///
/// ```text
/// Disconnected ──► Connecting ──► Connected
///      ▲               │              │
///      │               ▼              │
///      └────────────  Failed          │
///      └──────────────────────────────┘  (stop / 致命流错误 / 重新配置)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    /// 未连接（初始状态）
    #[default]
    Disconnected = 0,
    /// 正在握手
    Connecting = 1,
    /// 已连接，轮询和视频流在运行
    Connected = 2,
    /// 重试耗尽
    Failed = 3,
}

impl ConnectionState {
    /// 从 u8 转换
    ///
    /// 无效值返回 Disconnected。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Failed,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// 迁移是否合法
    ///
    /// Connecting 可以直接回到 Disconnected（握手过程中被 stop 或重新配置）。
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Failed, Connecting)
                | (Failed, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 连接状态（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use helmet_driver::state::{AtomicConnectionState, ConnectionState};
/// use std::sync::atomic::Ordering;
///
/// let state = AtomicConnectionState::new(ConnectionState::Disconnected);
/// assert!(state.transition(ConnectionState::Connecting));
/// assert!(!state.transition(ConnectionState::Connecting));
/// assert_eq!(state.get(Ordering::Acquire), ConnectionState::Connecting);
/// ```
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(ordering))
    }

    /// 无条件设置（只应由协调线程调用）
    pub fn set(&self, state: ConnectionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    pub fn compare_exchange(
        &self,
        current: ConnectionState,
        new: ConnectionState,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .is_ok()
    }

    /// 按迁移规则切换到 `next`
    ///
    /// 非法迁移（含原地迁移）返回 false，状态不变。
    pub fn transition(&self, next: ConnectionState) -> bool {
        let current = self.get(Ordering::Acquire);
        if !current.can_transition_to(next) {
            return false;
        }
        self.compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conversions() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Failed,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(ConnectionState::from_u8(200), ConnectionState::Disconnected);
    }

    #[test]
    fn test_allowed_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Connected.can_transition_to(Disconnected));

        // Connected 只能经由 stop/致命错误回到 Disconnected
        assert!(!Connected.can_transition_to(Failed));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_atomic_transition() {
        let state = AtomicConnectionState::default();
        assert!(!state.transition(ConnectionState::Connected));
        assert!(state.transition(ConnectionState::Connecting));
        assert!(state.transition(ConnectionState::Connected));
        assert!(state.get(Ordering::Relaxed).is_connected());
        assert!(state.transition(ConnectionState::Disconnected));
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
