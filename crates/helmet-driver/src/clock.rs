//! 时钟与取消令牌
//!
//! 所有等待（重试间隔、轮询间隔、重连延迟）都经过 [`Clock::sleep`]，
//! 并且可以被 [`CancelToken`] 立即唤醒。测试中用 [`ManualClock`] 替换，
//! 重试/退避逻辑无需真实等待即可验证。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// 单调时钟与墙上时钟的锚点（首次访问时确定，之后不变）
static ANCHOR: OnceLock<(Instant, SystemTime)> = OnceLock::new();

/// 把单调时间点换算成 Unix 毫秒时间戳
///
/// 内部状态一律使用 `Instant`（不受系统改时影响），只有交给 sink 的
/// 时间戳才换算成毫秒。
pub fn wall_millis(at: Instant) -> u64 {
    let (anchor_instant, anchor_wall) = *ANCHOR.get_or_init(|| (Instant::now(), SystemTime::now()));
    let wall = if at >= anchor_instant {
        anchor_wall + at.duration_since(anchor_instant)
    } else {
        anchor_wall
            .checked_sub(anchor_instant.duration_since(at))
            .unwrap_or(UNIX_EPOCH)
    };
    wall.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 取消令牌
///
/// 内部持有一个永不发送消息的 channel：`cancel()` 丢弃发送端，所有阻塞在
/// 接收端上的等待（包括 `select!`）都会立即返回。
///
/// # 示例
///
/// ```rust
/// use helmet_driver::CancelToken;
/// use std::time::Duration;
///
/// let token = CancelToken::new();
/// let worker = token.clone();
/// std::thread::spawn(move || {
///     // 最多等 60 秒，但 cancel() 会立即唤醒
///     worker.wait_timeout(Duration::from_secs(60));
/// });
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    sender: Arc<Mutex<Option<Sender<()>>>>,
    receiver: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            sender: Arc::new(Mutex::new(Some(tx))),
            receiver: rx,
        }
    }

    /// 取消（幂等）
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.sender.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 等待 `timeout`，被取消时提前返回
    ///
    /// # 返回
    ///
    /// - `true`: 已取消
    /// - `false`: 正常超时
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            _ => true,
        }
    }

    /// 取消信号的接收端，用于 `crossbeam_channel::select!`
    ///
    /// 取消后该接收端变为 disconnected，`recv` 立即返回 `Err`。
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// 时钟抽象
pub trait Clock: Send + Sync {
    /// 当前单调时间
    fn now(&self) -> Instant;

    /// 可取消的睡眠
    ///
    /// 返回 `false` 表示睡眠被取消，调用方应立即退出。
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// 真实时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        !cancel.wait_timeout(duration)
    }
}

/// 手动时钟（测试用）
///
/// `sleep()` 不真正等待，而是把时间向前拨并记录睡眠时长，
/// 便于断言重试间隔和退避策略。
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// 时间向前拨
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// 自创建以来经过的（虚拟）时间
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// 所有 `sleep()` 调用的时长记录
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.sleeps.lock().push(duration);
        self.advance(duration);
        !cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_wakes_waiter_immediately() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let cancelled = waiter.wait_timeout(Duration::from_secs(30));
            (cancelled, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (cancelled, elapsed) = handle.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(5), "waited {:?}", elapsed);
    }

    #[test]
    fn test_wait_timeout_without_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.receiver().recv().is_err());
    }

    #[test]
    fn test_system_clock_sleep_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!SystemClock.sleep(Duration::from_secs(10), &token));
    }

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        let t0 = clock.now();

        assert!(clock.sleep(Duration::from_millis(2000), &token));
        assert!(clock.sleep(Duration::from_millis(400), &token));

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(2000), Duration::from_millis(400)]
        );
        assert_eq!(clock.now() - t0, Duration::from_millis(2400));

        token.cancel();
        assert!(!clock.sleep(Duration::from_millis(1), &token));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn test_wall_millis_is_monotonic() {
        let now = Instant::now();
        let a = wall_millis(now);
        let b = wall_millis(now + Duration::from_millis(1500));
        assert_eq!(b - a, 1500);
        assert!(a > 1_600_000_000_000);
    }
}
