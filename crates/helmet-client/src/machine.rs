//! 困倦去抖与报警状态机
//!
//! 两级时间滤波：
//!
//! 1. **噪声去抖**：原始信号 `false`（睁眼）立即生效；`true`（闭眼）需保持
//!    `debounce`（默认 300ms）才被接受。重复的 `true` 不会重置窗口，
//!    窗口内回到 `false` 则取消接受。
//! 2. **持续时长触发**：接受困倦后启动 `alarm_threshold`（默认 1500ms）计时，
//!    到期时仍困倦则报警，每个连续困倦区间只报警一次、只记录一次事件。
//!
//! ```text
//!            accepted drowsy              threshold elapsed
//!   Alert ──────────────────▶ PendingDrowsy ────────────────▶ Alarming
//!     ▲                            │                             │
//!     └────────── accepted alert (立即，取消计时，停止报警) ─────┘
//! ```
//!
//! 状态机本身是纯数据结构：不持有线程也不读时钟，时间由调用方传入，
//! 产生的副作用以 [`AlarmEvent`] 列表返回。定时器队列线程
//! （[`AlarmTimerQueue`](crate::AlarmTimerQueue)）是它唯一的写入者。

use std::time::{Duration, Instant};

/// 去抖参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// 闭眼信号需要保持的时长（默认 300ms）
    pub debounce: Duration,
    /// 接受困倦后触发报警的持续时长（默认 1500ms）
    pub alarm_threshold: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            alarm_threshold: Duration::from_millis(1500),
        }
    }
}

/// 报警阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlarmPhase {
    /// 清醒（初始状态）
    #[default]
    Alert = 0,
    /// 已接受困倦，阈值计时中
    PendingDrowsy = 1,
    /// 报警中
    Alarming = 2,
}

impl AlarmPhase {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AlarmPhase::PendingDrowsy,
            2 => AlarmPhase::Alarming,
            _ => AlarmPhase::Alert,
        }
    }
}

/// 去抖后的稳定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncedState {
    pub stable_is_drowsy: bool,
    /// 进入当前稳定状态的时间
    pub state_entered_at: Instant,
    /// 原始信号最近一次变化的时间
    pub last_raw_change_at: Option<Instant>,
}

/// 一次连续困倦区间内的报警
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSession {
    pub active: bool,
    pub started_at: Instant,
    /// 本区间的事件是否已经记录
    pub event_already_logged: bool,
}

/// 状态机输出的副作用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmEvent {
    DrowsyStateChanged { is_drowsy: bool, at: Instant },
    AlarmActivated { at: Instant },
    AlarmDeactivated { at: Instant },
    /// 记录一次困倦事件（持久化）
    EventLogged { at: Instant },
}

/// 困倦状态机
#[derive(Debug, Clone)]
pub struct DrowsinessStateMachine {
    config: DebounceConfig,
    state: DebouncedState,
    raw: bool,
    accept_at: Option<Instant>,
    alarm_at: Option<Instant>,
    session: Option<AlarmSession>,
    last_now: Instant,
}

impl DrowsinessStateMachine {
    pub fn new(config: DebounceConfig, now: Instant) -> Self {
        Self {
            config,
            state: DebouncedState {
                stable_is_drowsy: false,
                state_entered_at: now,
                last_raw_change_at: None,
            },
            raw: false,
            accept_at: None,
            alarm_at: None,
            session: None,
            last_now: now,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn phase(&self) -> AlarmPhase {
        if !self.state.stable_is_drowsy {
            AlarmPhase::Alert
        } else if self.session.is_some_and(|s| s.active) {
            AlarmPhase::Alarming
        } else {
            AlarmPhase::PendingDrowsy
        }
    }

    pub fn debounced(&self) -> &DebouncedState {
        &self.state
    }

    pub fn alarm_session(&self) -> Option<&AlarmSession> {
        self.session.as_ref()
    }

    /// 最近的待触发时间（接受困倦或报警阈值）
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.accept_at, self.alarm_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// 处理一个原始采样
    ///
    /// 先触发 `now` 之前已经到期的计时，再应用采样。
    pub fn on_sample(&mut self, is_drowsy: bool, now: Instant) -> Vec<AlarmEvent> {
        let now = self.clamp(now);
        let mut events = Vec::new();
        self.fire_due(now, &mut events);

        if is_drowsy != self.raw {
            self.raw = is_drowsy;
            self.state.last_raw_change_at = Some(now);
        }

        if is_drowsy {
            // 窗口只在值变化时开始，重复的 true 不重置
            if !self.state.stable_is_drowsy && self.accept_at.is_none() {
                self.accept_at = Some(now + self.config.debounce);
            }
        } else {
            self.accept_at = None;
            self.enter_alert(now, &mut events);
        }

        self.fire_due(now, &mut events);
        events
    }

    /// 定时器到期
    pub fn on_timer(&mut self, now: Instant) -> Vec<AlarmEvent> {
        let now = self.clamp(now);
        let mut events = Vec::new();
        self.fire_due(now, &mut events);
        events
    }

    /// 回到清醒状态（会话停止或重新配置时调用）
    ///
    /// 取消所有计时；如果正在报警，同步产生 `AlarmDeactivated`。
    pub fn reset(&mut self, now: Instant) -> Vec<AlarmEvent> {
        let now = self.clamp(now);
        let mut events = Vec::new();
        self.raw = false;
        self.accept_at = None;
        self.enter_alert(now, &mut events);
        events
    }

    // 时间只进不退
    fn clamp(&mut self, now: Instant) -> Instant {
        let now = now.max(self.last_now);
        self.last_now = now;
        now
    }

    fn fire_due(&mut self, now: Instant, events: &mut Vec<AlarmEvent>) {
        if let Some(at) = self.accept_at
            && at <= now
        {
            self.accept_at = None;
            self.accept_drowsy(at, events);
        }
        if let Some(at) = self.alarm_at
            && at <= now
        {
            self.alarm_at = None;
            self.activate_alarm(at, events);
        }
    }

    fn accept_drowsy(&mut self, at: Instant, events: &mut Vec<AlarmEvent>) {
        if self.state.stable_is_drowsy {
            return;
        }
        self.state.stable_is_drowsy = true;
        self.state.state_entered_at = at;
        events.push(AlarmEvent::DrowsyStateChanged {
            is_drowsy: true,
            at,
        });

        if self.alarm_at.is_none() && self.session.is_none() {
            self.alarm_at = Some(at + self.config.alarm_threshold);
        }
    }

    fn activate_alarm(&mut self, at: Instant, events: &mut Vec<AlarmEvent>) {
        if !self.state.stable_is_drowsy {
            return;
        }
        let session = self.session.get_or_insert(AlarmSession {
            active: false,
            started_at: at,
            event_already_logged: false,
        });
        if session.active {
            return;
        }
        session.active = true;
        session.started_at = at;
        events.push(AlarmEvent::AlarmActivated { at });

        if !session.event_already_logged {
            session.event_already_logged = true;
            events.push(AlarmEvent::EventLogged { at });
        }
    }

    fn enter_alert(&mut self, at: Instant, events: &mut Vec<AlarmEvent>) {
        self.alarm_at = None;
        if self.state.stable_is_drowsy {
            self.state.stable_is_drowsy = false;
            self.state.state_entered_at = at;
            events.push(AlarmEvent::DrowsyStateChanged {
                is_drowsy: false,
                at,
            });
        }
        if let Some(session) = self.session.take()
            && session.active
        {
            events.push(AlarmEvent::AlarmDeactivated { at });
        }
    }
}
