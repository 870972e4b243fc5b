//! 终端报警执行器
//!
//! 没有扬声器和振动马达时，用终端响铃（BEL）模拟：按提示音对应的
//! 振动模式循环，每个"振动"片段响一次铃。

use helmet_sdk::AlarmActuator;
use helmet_sdk::driver::{CancelToken, JoinTimeout, spawn_named};
use helmet_sdk::tools::AlertTone;
use parking_lot::Mutex;
use std::io::Write;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::warn;

struct Ringing {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// 终端响铃执行器
pub struct TerminalAlarm {
    /// 是否按振动模式重复响铃（否则每个循环只响一次）
    follow_pattern: bool,
    ringing: Mutex<Option<Ringing>>,
}

impl TerminalAlarm {
    pub fn new(follow_pattern: bool) -> Self {
        Self {
            follow_pattern,
            ringing: Mutex::new(None),
        }
    }
}

fn ring() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}

fn ring_loop(tone: AlertTone, follow_pattern: bool, cancel: CancelToken) {
    let pattern = tone.vibration();
    while !cancel.is_cancelled() {
        if follow_pattern {
            for (duration, on) in pattern.segments() {
                if on {
                    ring();
                }
                if cancel.wait_timeout(duration) {
                    return;
                }
            }
        } else {
            ring();
            if cancel.wait_timeout(pattern.cycle()) {
                return;
            }
        }
    }
}

impl AlarmActuator for TerminalAlarm {
    fn start(&self, tone: AlertTone) {
        let mut ringing = self.ringing.lock();
        if ringing.is_some() {
            return;
        }

        println!("🔔 报警: {}", tone);
        let cancel = CancelToken::new();
        let worker = cancel.clone();
        let follow_pattern = self.follow_pattern;
        match spawn_named("helmet-cli-alarm", move || ring_loop(tone, follow_pattern, worker)) {
            Ok(handle) => *ringing = Some(Ringing { cancel, handle }),
            Err(e) => warn!("Failed to start alarm thread: {}", e),
        }
    }

    fn stop(&self) {
        let Some(ringing) = self.ringing.lock().take() else {
            return;
        };
        ringing.cancel.cancel();
        if ringing.handle.join_timeout(Duration::from_secs(1)).is_err() {
            warn!("Alarm thread did not stop in time");
        }
        println!("🔕 报警解除");
    }
}
