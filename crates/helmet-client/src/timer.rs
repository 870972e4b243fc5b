//! 报警定时器队列
//!
//! 单一线程（`helmet-timer`）串行处理检测采样、去抖/阈值计时和复位，
//! 是 [`DrowsinessStateMachine`] 唯一的写入者。其他线程只通过消息与它交互。
//!
//! 每条采样都带有会话代号（generation）。复位时切换到新代号，
//! 之后到达的旧代号采样直接丢弃；复位完成后没有任何计时残留，
//! 因此 `stop()` 返回后不会再有报警触发。

use crate::actuator::AlarmActuator;
use crate::machine::{AlarmEvent, AlarmPhase, DebounceConfig, DrowsinessStateMachine};
use crossbeam_channel::{Receiver, Sender, after, bounded, never, select, unbounded};
use helmet_driver::{
    Clock, DetectionSample, DriverError, JoinTimeout, SessionMetrics, SessionSink, SinkManager,
    spawn_named, wall_millis,
};
use helmet_tools::AlertTone;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

enum TimerCommand {
    Sample {
        generation: u64,
        is_drowsy: bool,
        observed_at: Instant,
    },
    Reset {
        generation: u64,
        ack: Sender<()>,
    },
    Shutdown,
}

/// 向定时器队列投递采样的句柄（可克隆，给轮询线程使用）
#[derive(Clone)]
pub struct SampleSender {
    tx: Sender<TimerCommand>,
}

impl SampleSender {
    /// 投递一个采样（非阻塞）
    ///
    /// 队列已关闭时返回 `false`。
    pub fn submit(&self, generation: u64, sample: &DetectionSample) -> bool {
        self.tx
            .send(TimerCommand::Sample {
                generation,
                is_drowsy: sample.is_drowsy,
                observed_at: sample.observed_at,
            })
            .is_ok()
    }
}

/// 定时器队列的输出对象
struct Outputs {
    sinks: SinkManager,
    actuator: Arc<dyn AlarmActuator>,
    tone: AlertTone,
    metrics: Arc<SessionMetrics>,
}

impl Outputs {
    fn dispatch(&self, events: Vec<AlarmEvent>) {
        for event in events {
            match event {
                AlarmEvent::DrowsyStateChanged { is_drowsy, at } => {
                    info!("Driver state: {}", if is_drowsy { "drowsy" } else { "alert" });
                    self.sinks.on_drowsy_state_changed(is_drowsy, wall_millis(at));
                },
                AlarmEvent::AlarmActivated { .. } => {
                    warn!("Drowsiness alarm activated");
                    self.metrics.alarms_activated.fetch_add(1, Ordering::Relaxed);
                    self.actuator.start(self.tone);
                    self.sinks.on_alarm_activated();
                },
                AlarmEvent::AlarmDeactivated { .. } => {
                    info!("Drowsiness alarm deactivated");
                    self.actuator.stop();
                    self.sinks.on_alarm_deactivated();
                },
                AlarmEvent::EventLogged { at } => {
                    self.sinks.log_drowsiness_event(wall_millis(at));
                },
            }
        }
    }
}

/// 报警定时器队列
pub struct AlarmTimerQueue {
    tx: Sender<TimerCommand>,
    phase: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl AlarmTimerQueue {
    /// 启动 `helmet-timer` 线程
    pub fn spawn(
        config: DebounceConfig,
        tone: AlertTone,
        clock: Arc<dyn Clock>,
        sinks: SinkManager,
        actuator: Arc<dyn AlarmActuator>,
        metrics: Arc<SessionMetrics>,
    ) -> Result<Self, DriverError> {
        let (tx, rx) = unbounded();
        let phase = Arc::new(AtomicU8::new(AlarmPhase::Alert as u8));
        let outputs = Outputs {
            sinks,
            actuator,
            tone,
            metrics,
        };

        let machine = DrowsinessStateMachine::new(config, clock.now());
        let phase_out = phase.clone();
        let handle = spawn_named("helmet-timer", move || {
            timer_loop(machine, clock, rx, outputs, phase_out);
        })?;

        Ok(Self {
            tx,
            phase,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> SampleSender {
        SampleSender {
            tx: self.tx.clone(),
        }
    }

    /// 当前报警阶段
    pub fn phase(&self) -> AlarmPhase {
        AlarmPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// 复位到清醒状态并切换到新代号，等待队列线程确认
    ///
    /// 返回 `false` 表示队列线程未在 `timeout` 内确认（或已退出）。
    pub fn reset(&self, generation: u64, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self
            .tx
            .send(TimerCommand::Reset {
                generation,
                ack: ack_tx,
            })
            .is_err()
        {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// 停止队列线程
    pub fn shutdown(&mut self, timeout: Duration) {
        let _ = self.tx.send(TimerCommand::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join_timeout(timeout).is_err()
        {
            warn!("Timer queue did not exit within {:?}", timeout);
        }
    }
}

impl Drop for AlarmTimerQueue {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(1));
    }
}

fn timer_loop(
    mut machine: DrowsinessStateMachine,
    clock: Arc<dyn Clock>,
    rx: Receiver<TimerCommand>,
    outputs: Outputs,
    phase: Arc<AtomicU8>,
) {
    debug!("Timer queue started");
    let mut generation = 0u64;

    loop {
        let deadline = match machine.next_deadline() {
            Some(at) => after(at.saturating_duration_since(clock.now())),
            None => never(),
        };

        let command = select! {
            recv(rx) -> msg => msg.unwrap_or(TimerCommand::Shutdown),
            recv(deadline) -> _ => {
                outputs.dispatch(machine.on_timer(clock.now()));
                phase.store(machine.phase() as u8, Ordering::Release);
                continue;
            },
        };

        match command {
            TimerCommand::Sample {
                generation: g,
                is_drowsy,
                observed_at,
            } => {
                if g == generation {
                    outputs.dispatch(machine.on_sample(is_drowsy, observed_at));
                } else {
                    trace!(
                        "Dropping sample from stale generation {} (current {})",
                        g, generation
                    );
                }
                phase.store(machine.phase() as u8, Ordering::Release);
            },
            TimerCommand::Reset { generation: g, ack } => {
                generation = g;
                outputs.dispatch(machine.reset(clock.now()));
                phase.store(machine.phase() as u8, Ordering::Release);
                let _ = ack.send(());
            },
            TimerCommand::Shutdown => {
                outputs.dispatch(machine.reset(clock.now()));
                break;
            },
        }
    }

    phase.store(AlarmPhase::Alert as u8, Ordering::Release);
    debug!("Timer queue stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmet_driver::{ChannelSink, SessionEvent, SystemClock};
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingActuator {
        starts: AtomicU32,
        stops: AtomicU32,
    }

    impl AlarmActuator for CountingActuator {
        fn start(&self, tone: AlertTone) {
            assert_eq!(tone, AlertTone::EmergencySiren);
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config() -> DebounceConfig {
        DebounceConfig {
            debounce: Duration::from_millis(30),
            alarm_threshold: Duration::from_millis(150),
        }
    }

    fn setup() -> (
        AlarmTimerQueue,
        Arc<CountingActuator>,
        Receiver<SessionEvent>,
        Arc<SessionMetrics>,
    ) {
        let (sink, rx) = ChannelSink::new(64);
        let mut sinks = SinkManager::new();
        sinks.add_sink(Arc::new(sink));
        let actuator = Arc::new(CountingActuator::default());
        let metrics = Arc::new(SessionMetrics::new());
        let queue = AlarmTimerQueue::spawn(
            fast_config(),
            AlertTone::EmergencySiren,
            Arc::new(SystemClock),
            sinks,
            actuator.clone(),
            metrics.clone(),
        )
        .unwrap();
        (queue, actuator, rx, metrics)
    }

    fn sample(is_drowsy: bool) -> DetectionSample {
        DetectionSample {
            is_drowsy,
            confidence: 0.9,
            detections: Vec::new(),
            observed_at: Instant::now(),
        }
    }

    #[test]
    fn test_timer_fires_alarm_without_further_samples() {
        let (queue, actuator, rx, metrics) = setup();
        assert!(queue.reset(1, Duration::from_secs(1)));

        queue.sender().submit(1, &sample(true));
        std::thread::sleep(Duration::from_millis(400));

        assert_eq!(queue.phase(), AlarmPhase::Alarming);
        assert_eq!(actuator.starts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().alarms_activated, 1);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(
            events[0],
            SessionEvent::DrowsyStateChanged { is_drowsy: true, .. }
        ));
        assert!(matches!(events[1], SessionEvent::AlarmActivated));
        assert!(matches!(events[2], SessionEvent::DrowsinessEventLogged { .. }));

        queue.sender().submit(1, &sample(false));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.phase(), AlarmPhase::Alert);
        assert_eq!(actuator.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_while_threshold_pending_prevents_alarm() {
        let (queue, actuator, rx, _metrics) = setup();
        assert!(queue.reset(1, Duration::from_secs(1)));

        queue.sender().submit(1, &sample(true));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(queue.phase(), AlarmPhase::PendingDrowsy);

        assert!(queue.reset(2, Duration::from_secs(1)));
        assert_eq!(queue.phase(), AlarmPhase::Alert);

        // 旧代号的采样被丢弃
        queue.sender().submit(1, &sample(true));
        std::thread::sleep(Duration::from_millis(300));

        assert_eq!(queue.phase(), AlarmPhase::Alert);
        assert_eq!(actuator.starts.load(Ordering::SeqCst), 0);
        assert!(
            !rx.try_iter()
                .any(|e| matches!(e, SessionEvent::AlarmActivated))
        );
    }

    #[test]
    fn test_shutdown_stops_active_alarm() {
        let (mut queue, actuator, _rx, _metrics) = setup();
        assert!(queue.reset(1, Duration::from_secs(1)));
        queue.sender().submit(1, &sample(true));
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(actuator.starts.load(Ordering::SeqCst), 1);

        queue.shutdown(Duration::from_secs(1));
        assert_eq!(actuator.stops.load(Ordering::SeqCst), 1);
        assert!(!queue.sender().submit(1, &sample(true)));
    }
}
