//! 持久化 sink：把报警相关回调写入 [`EventLog`]

use helmet_driver::{SessionSink, wall_millis};
use helmet_tools::{EventLog, StatusRecord};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// 状态记录 sink
pub struct StatusRecorder {
    log: Arc<dyn EventLog>,
}

impl StatusRecorder {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    fn record(&self, record: StatusRecord) {
        // 持久化失败不影响报警本身
        if let Err(e) = self.log.record(record) {
            warn!("Failed to record {:?}: {}", record, e);
        }
    }
}

impl SessionSink for StatusRecorder {
    fn on_drowsy_state_changed(&self, is_drowsy: bool, timestamp_ms: u64) {
        self.record(StatusRecord::DrowsyStateChanged {
            is_drowsy,
            timestamp_ms,
        });
    }

    fn on_alarm_activated(&self) {
        self.record(StatusRecord::AlarmActivated {
            timestamp_ms: wall_millis(Instant::now()),
        });
    }

    fn on_alarm_deactivated(&self) {
        self.record(StatusRecord::AlarmDeactivated {
            timestamp_ms: wall_millis(Instant::now()),
        });
    }

    fn log_drowsiness_event(&self, timestamp_ms: u64) {
        self.record(StatusRecord::DrowsinessEvent { timestamp_ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmet_tools::MemoryEventLog;

    #[test]
    fn test_records_alarm_cycle() {
        let log = Arc::new(MemoryEventLog::new());
        let recorder = StatusRecorder::new(log.clone());

        recorder.on_drowsy_state_changed(true, 1_000);
        recorder.on_alarm_activated();
        recorder.log_drowsiness_event(2_500);
        recorder.on_drowsy_state_changed(false, 4_000);
        recorder.on_alarm_deactivated();

        let status = log.status();
        assert_eq!(status.events_count, 1);
        assert_eq!(status.last_event, Some(4_000));
        assert!(!status.alarm_active);
        assert_eq!(log.records().len(), 5);
    }

    #[test]
    fn test_ignores_connection_callbacks() {
        let log = Arc::new(MemoryEventLog::new());
        let recorder = StatusRecorder::new(log.clone());
        recorder.on_connection_failed("unreachable");
        assert!(log.records().is_empty());
    }
}
