//! 报警执行器（声音 + 振动）

use helmet_tools::AlertTone;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// 报警执行器
///
/// 由定时器队列线程调用：进入报警时 `start` 一次，回到清醒时 `stop` 一次。
/// 实现应当立即返回（例如把播放交给自己的线程）。
pub trait AlarmActuator: Send + Sync {
    /// 开始循环播放提示音和振动
    fn start(&self, tone: AlertTone);

    /// 停止（未在播放时调用应无副作用）
    fn stop(&self);
}

/// 空执行器（无声）
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActuator;

impl AlarmActuator for NullActuator {
    fn start(&self, tone: AlertTone) {
        debug!("Alarm started (silent, tone={})", tone);
    }

    fn stop(&self) {
        debug!("Alarm stopped (silent)");
    }
}

/// 保证启停成对出现的包装
///
/// 重复的 `start` 和未启动时的 `stop` 都会被吞掉。
pub struct LatchedActuator {
    inner: Arc<dyn AlarmActuator>,
    playing: Mutex<Option<AlertTone>>,
}

impl LatchedActuator {
    pub fn new(inner: Arc<dyn AlarmActuator>) -> Self {
        Self {
            inner,
            playing: Mutex::new(None),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.lock().is_some()
    }
}

impl AlarmActuator for LatchedActuator {
    fn start(&self, tone: AlertTone) {
        let mut playing = self.playing.lock();
        if playing.is_none() {
            *playing = Some(tone);
            self.inner.start(tone);
        }
    }

    fn stop(&self) {
        let mut playing = self.playing.lock();
        if playing.take().is_some() {
            self.inner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counting {
        starts: AtomicU32,
        stops: AtomicU32,
    }

    impl AlarmActuator for Counting {
        fn start(&self, _tone: AlertTone) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_latched_start_stop_pairs() {
        let inner = Arc::new(Counting::default());
        let latched = LatchedActuator::new(inner.clone());

        latched.stop();
        latched.start(AlertTone::PulseAlert);
        latched.start(AlertTone::PulseAlert);
        assert!(latched.is_playing());
        latched.stop();
        latched.stop();

        assert_eq!(inner.starts.load(Ordering::SeqCst), 1);
        assert_eq!(inner.stops.load(Ordering::SeqCst), 1);
        assert!(!latched.is_playing());
    }
}
