//! 会话集成测试
//!
//! 通过 facade 组装完整会话（内存传输 + channel sink + 状态日志），验证：
//! 1. 持续困倦 → 报警一次、记录一次事件，清醒后报警解除
//! 2. 握手重试耗尽 → 只通知一次失败
//! 3. 阈值计时中 stop → 报警永不触发
//! 4. 视频流帧经过切帧和解码后到达 sink
//! 5. 配置文件驱动会话参数，地址变更写回配置文件

use crossbeam_channel::Receiver;
use helmet_sdk::client::{AlarmActuator, AlarmPhase, FileEndpointStore, SessionConfig};
use helmet_sdk::driver::mock::{MockTransport, fake_jpeg};
use helmet_sdk::driver::{DecodedFrame, DriverError, FrameCodec, RetryPolicy};
use helmet_sdk::protocol::{DetectionReport, StreamFrame};
use helmet_sdk::tools::{EventLog, HelmetConfig, MemoryEventLog};
use helmet_sdk::{
    AlertTone, ChannelSink, ConnectionState, HelmetSession, SessionBuilder, SessionEvent,
};
use std::cell::Cell;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

/// 执行器调用记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recorded {
    Start(AlertTone),
    Stop,
}

#[derive(Default)]
struct RecordingActuator {
    calls: Mutex<Vec<Recorded>>,
}

impl RecordingActuator {
    fn starts(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Recorded::Start(_)))
            .count()
    }
}

impl AlarmActuator for RecordingActuator {
    fn start(&self, tone: AlertTone) {
        self.calls.lock().unwrap().push(Recorded::Start(tone));
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push(Recorded::Stop);
    }
}

/// 不做真实解码，只保留 JPEG 字节
struct PassthroughCodec;

impl FrameCodec for PassthroughCodec {
    fn decode(&self, frame: &StreamFrame) -> Result<DecodedFrame, DriverError> {
        Ok(DecodedFrame {
            jpeg: frame.clone().into_bytes(),
            image: Arc::new(image::RgbImage::new(1, 1)),
        })
    }
}

fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.retry = RetryPolicy {
        max_attempts: 5,
        retry_delay: Duration::from_millis(10),
        attempt_timeout: Duration::from_millis(500),
    };
    config.poller.interval = Duration::from_millis(10);
    config.debounce.debounce = Duration::from_millis(30);
    config.debounce.alarm_threshold = Duration::from_millis(150);
    config.stream.reconnect_delay = Duration::from_millis(20);
    config.stream.min_display_interval = Duration::ZERO;
    config
}

fn drowsy() -> DetectionReport {
    DetectionReport::from_json(br#"{"is_drowsy": true, "confidence": 0.9}"#).unwrap()
}

/// 收集事件直到 `done` 返回 true 或超时
fn collect_until(
    rx: &Receiver<SessionEvent>,
    timeout: Duration,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => {
                let finished = done(&event);
                events.push(event);
                if finished {
                    break;
                }
            },
            Err(_) => break,
        }
    }
    events
}

fn wait_for_phase(session: &HelmetSession, phase: AlarmPhase) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if session.alarm_phase() == phase {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn count(events: &[SessionEvent], pred: impl Fn(&SessionEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[test]
fn test_sustained_drowsiness_alarms_once_then_clears() {
    let transport = Arc::new(MockTransport::new());
    // 约 400ms 困倦，之后脚本耗尽，服务器一直返回清醒
    for _ in 0..40 {
        transport.push_detect(Ok(drowsy()));
    }

    let log = Arc::new(MemoryEventLog::new());
    let actuator = Arc::new(RecordingActuator::default());
    let (sink, rx) = ChannelSink::new(4096);
    let mut config = fast_config();
    config.tone = AlertTone::EmergencySiren;

    let session = SessionBuilder::new()
        .endpoint("10.0.0.1:5000")
        .config(config)
        .transport(transport)
        .actuator(actuator.clone())
        .event_log(log.clone())
        .sink(Arc::new(sink.without_frames()))
        .surface_active(false)
        .build()
        .unwrap();

    session.start().unwrap();
    let events = collect_until(&rx, WAIT, |e| matches!(e, SessionEvent::AlarmDeactivated));

    assert_eq!(count(&events, |e| matches!(e, SessionEvent::AlarmActivated)), 1);
    assert_eq!(count(&events, |e| matches!(e, SessionEvent::AlarmDeactivated)), 1);
    assert_eq!(
        count(&events, |e| matches!(e, SessionEvent::DrowsinessEventLogged { .. })),
        1
    );

    // 去抖后的状态先变为困倦，再触发报警
    let accepted = events
        .iter()
        .position(|e| matches!(e, SessionEvent::DrowsyStateChanged { is_drowsy: true, .. }))
        .unwrap();
    let alarm = events
        .iter()
        .position(|e| matches!(e, SessionEvent::AlarmActivated))
        .unwrap();
    assert!(accepted < alarm);

    let status = log.status();
    assert_eq!(status.events_count, 1);
    assert!(!status.alarm_active);
    assert!(!status.is_drowsy);
    assert!(status.last_event.is_some());

    let calls = actuator.calls.lock().unwrap().clone();
    assert_eq!(calls.first(), Some(&Recorded::Start(AlertTone::EmergencySiren)));
    assert_eq!(actuator.starts(), 1);
    assert_eq!(calls.last(), Some(&Recorded::Stop));
    assert_eq!(session.metrics().alarms_activated, 1);

    session.stop().unwrap();
    assert_eq!(session.alarm_phase(), AlarmPhase::Alert);
}

#[test]
fn test_exhausted_retries_notify_once() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..5 {
        transport.push_health(Err(MockTransport::refused("http://10.0.0.9:5000/health")));
    }
    let (sink, rx) = ChannelSink::new(1024);

    let session = SessionBuilder::new()
        .endpoint("10.0.0.9:5000")
        .config(fast_config())
        .transport(transport.clone())
        .sink(Arc::new(sink))
        .build()
        .unwrap();

    session.start().unwrap();
    assert!(session.wait_for_state(ConnectionState::Failed, WAIT));
    assert_eq!(transport.health_calls.load(Ordering::SeqCst), 5);
    assert_eq!(transport.detect_calls.load(Ordering::SeqCst), 0);

    let events = collect_until(&rx, Duration::from_millis(200), |_| false);
    assert_eq!(
        count(&events, |e| matches!(e, SessionEvent::ConnectionFailed(_))),
        1
    );
    assert_eq!(session.metrics().connect_attempts, 5);

    // 失败后可以重新开始
    session.start().unwrap();
    assert!(session.wait_for_state(ConnectionState::Connected, WAIT));
}

#[test]
fn test_stop_during_threshold_never_alarms() {
    let transport = Arc::new(MockTransport::new());
    for _ in 0..500 {
        transport.push_detect(Ok(drowsy()));
    }
    let actuator = Arc::new(RecordingActuator::default());
    let (sink, rx) = ChannelSink::new(4096);
    let mut config = fast_config();
    config.debounce.alarm_threshold = Duration::from_secs(2);

    let session = SessionBuilder::new()
        .config(config)
        .transport(transport)
        .actuator(actuator.clone())
        .sink(Arc::new(sink.without_frames()))
        .surface_active(false)
        .build()
        .unwrap();

    session.start().unwrap();
    collect_until(&rx, WAIT, |e| {
        matches!(e, SessionEvent::DrowsyStateChanged { is_drowsy: true, .. })
    });
    assert!(wait_for_phase(&session, AlarmPhase::PendingDrowsy));

    session.stop().unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.alarm_phase(), AlarmPhase::Alert);

    // 原阈值到期之后仍然没有报警
    let late = collect_until(&rx, Duration::from_millis(2300), |_| false);
    assert_eq!(count(&late, |e| matches!(e, SessionEvent::AlarmActivated)), 0);
    assert_eq!(actuator.starts(), 0);
    assert_eq!(session.metrics().alarms_activated, 0);
}

#[test]
fn test_stream_frames_reach_sink() {
    let transport = Arc::new(MockTransport::new());

    // 完整帧、过短的残缺帧、完整帧 → 两帧
    let mut body = fake_jpeg(100, 0x11);
    body.extend([0xFF, 0xD8]);
    body.extend(std::iter::repeat_n(0x22u8, 50));
    body.extend(fake_jpeg(120, 0x33));
    transport.push_stream(Ok(Box::new(Cursor::new(body))));

    let (sink, rx) = ChannelSink::new(1024);
    let session = SessionBuilder::new()
        .config(fast_config())
        .transport(transport.clone())
        .codec(Arc::new(PassthroughCodec))
        .sink(Arc::new(sink))
        .surface_active(true)
        .build()
        .unwrap();

    session.start().unwrap();
    let seen = Cell::new(0);
    let events = collect_until(&rx, WAIT, |e| {
        if matches!(e, SessionEvent::Frame(_)) {
            seen.set(seen.get() + 1);
        }
        seen.get() == 2
    });
    let frames: Vec<DecodedFrame> = events
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Frame(frame) => Some(frame),
            _ => None,
        })
        .collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].jpeg.len(), 104);
    assert_eq!(frames[1].jpeg.len(), 124);
    assert!(session.metrics().frames_received >= 2);

    // 画面销毁后不再拉流，轮询继续
    session.surface_destroyed().unwrap();
    let streams = transport.stream_calls.load(Ordering::SeqCst);
    let polls = transport.detect_calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.stream_calls.load(Ordering::SeqCst), streams);
    assert!(transport.detect_calls.load(Ordering::SeqCst) > polls);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_config_file_drives_session_and_persists_endpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut file = HelmetConfig::default();
    file.set_value("server.url", "10.0.0.5:5000").unwrap();
    file.set_value("alert.tone", "pulse-alert").unwrap();
    file.set_value("timing.retry_attempts", "2").unwrap();
    file.set_value("timing.retry_delay_ms", "10").unwrap();
    file.save_to_file(&path).unwrap();

    let loaded = HelmetConfig::load_from_file(&path).unwrap();
    let config = SessionConfig::from_file_config(&loaded);
    assert_eq!(config.tone, AlertTone::PulseAlert);
    assert_eq!(config.retry.max_attempts, 2);

    let store = Arc::new(FileEndpointStore::new(&path));
    let transport = Arc::new(MockTransport::new());
    for _ in 0..2 {
        transport.push_health(Err(MockTransport::refused("http://10.0.0.5:5000/health")));
    }

    let session = SessionBuilder::new()
        .endpoint(loaded.endpoint().unwrap().as_str())
        .config(config)
        .transport(transport.clone())
        .endpoint_store(store.clone())
        .surface_active(false)
        .build()
        .unwrap();

    session.start().unwrap();
    assert!(session.wait_for_state(ConnectionState::Failed, WAIT));
    assert_eq!(transport.health_calls.load(Ordering::SeqCst), 2);

    // 新地址写回配置文件并立即重连
    session.set_endpoint("10.0.0.6:5000/", true, true).unwrap();
    assert!(session.wait_for_state(ConnectionState::Connected, WAIT));
    assert_eq!(
        store.load().unwrap().map(|e| e.as_str().to_string()),
        Some("http://10.0.0.6:5000".to_string())
    );

    let reloaded = HelmetConfig::load_from_file(&path).unwrap();
    assert_eq!(reloaded.alert.tone, AlertTone::PulseAlert);
    assert_eq!(reloaded.timing.retry_attempts, Some(2));

    drop(session);
}

#[test]
fn test_session_drop_stops_workers() {
    let transport = Arc::new(MockTransport::new());
    let session: HelmetSession = SessionBuilder::new()
        .config(fast_config())
        .transport(transport.clone())
        .surface_active(false)
        .build()
        .unwrap();

    session.start().unwrap();
    assert!(session.wait_for_state(ConnectionState::Connected, WAIT));
    drop(session);

    let polls = transport.detect_calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.detect_calls.load(Ordering::SeqCst), polls);
}
