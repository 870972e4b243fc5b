//! # 头盔状态记录
//!
//! 持久化 sink 收到的每条事件都会折叠进 [`HelmetStatus`]：
//! - 去抖后的困倦状态变化：更新 `is_drowsy` 和 `last_event`
//! - 报警开始/结束：更新 `alarm_active`
//! - 困倦事件（报警触发时记录）：`events_count + 1` 并更新 `last_event`
//!
//! 短暂闭眼不会产生报警，因此也不计入 `events_count`。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 事件日志错误
#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("Event log IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed event record at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode event record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 一条状态事件（时间戳为 Unix 毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusRecord {
    DrowsyStateChanged { is_drowsy: bool, timestamp_ms: u64 },
    AlarmActivated { timestamp_ms: u64 },
    AlarmDeactivated { timestamp_ms: u64 },
    DrowsinessEvent { timestamp_ms: u64 },
}

impl StatusRecord {
    pub fn timestamp_ms(&self) -> u64 {
        match *self {
            StatusRecord::DrowsyStateChanged { timestamp_ms, .. }
            | StatusRecord::AlarmActivated { timestamp_ms }
            | StatusRecord::AlarmDeactivated { timestamp_ms }
            | StatusRecord::DrowsinessEvent { timestamp_ms } => timestamp_ms,
        }
    }
}

/// 头盔状态汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmetStatus {
    pub is_drowsy: bool,
    pub alarm_active: bool,
    pub events_count: u64,
    /// 最近一次事件时间（`None` 表示还没有事件）
    pub last_event: Option<u64>,
}

impl HelmetStatus {
    /// 折叠一条事件
    pub fn apply(&mut self, record: &StatusRecord) {
        match *record {
            StatusRecord::DrowsyStateChanged {
                is_drowsy,
                timestamp_ms,
            } => {
                self.is_drowsy = is_drowsy;
                self.last_event = Some(timestamp_ms);
            },
            StatusRecord::AlarmActivated { .. } => self.alarm_active = true,
            StatusRecord::AlarmDeactivated { .. } => self.alarm_active = false,
            StatusRecord::DrowsinessEvent { timestamp_ms } => {
                self.events_count += 1;
                self.last_event = Some(timestamp_ms);
            },
        }
    }

    /// 供界面展示的最近事件描述
    pub fn last_event_label(&self) -> String {
        match self.last_event {
            Some(ts) => ts.to_string(),
            None => "No events yet".to_string(),
        }
    }
}

/// 状态事件存储
pub trait EventLog: Send + Sync {
    /// 追加一条事件
    fn record(&self, record: StatusRecord) -> Result<(), EventLogError>;

    /// 当前汇总状态
    fn status(&self) -> HelmetStatus;
}

/// 内存事件日志（测试、无持久化场景）
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    inner: Mutex<(HelmetStatus, Vec<StatusRecord>)>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的全部事件
    pub fn records(&self) -> Vec<StatusRecord> {
        self.inner.lock().1.clone()
    }
}

impl EventLog for MemoryEventLog {
    fn record(&self, record: StatusRecord) -> Result<(), EventLogError> {
        let mut inner = self.inner.lock();
        inner.0.apply(&record);
        inner.1.push(record);
        Ok(())
    }

    fn status(&self) -> HelmetStatus {
        self.inner.lock().0
    }
}

/// JSON Lines 事件日志（每行一条 [`StatusRecord`]，只追加）
///
/// 打开时回放已有记录以恢复 [`HelmetStatus`]，重启后计数不会丢失。
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    inner: Mutex<(HelmetStatus, File)>,
}

impl JsonlEventLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let status = Self::replay(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new((status, file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取文件中的全部事件
    pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<StatusRecord>, EventLogError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| EventLogError::Malformed {
                line: index + 1,
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn replay(path: &Path) -> Result<HelmetStatus, EventLogError> {
        let mut status = HelmetStatus::default();
        for record in Self::read_records(path)? {
            status.apply(&record);
        }
        Ok(status)
    }
}

impl EventLog for JsonlEventLog {
    fn record(&self, record: StatusRecord) -> Result<(), EventLogError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut inner = self.inner.lock();
        inner.1.write_all(&line)?;
        inner.1.flush()?;
        inner.0.apply(&record);
        Ok(())
    }

    fn status(&self) -> HelmetStatus {
        self.inner.lock().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn alarm_cycle(log: &dyn EventLog, start: u64) {
        log.record(StatusRecord::DrowsyStateChanged {
            is_drowsy: true,
            timestamp_ms: start,
        })
        .unwrap();
        log.record(StatusRecord::AlarmActivated {
            timestamp_ms: start + 1500,
        })
        .unwrap();
        log.record(StatusRecord::DrowsinessEvent {
            timestamp_ms: start + 1500,
        })
        .unwrap();
        log.record(StatusRecord::DrowsyStateChanged {
            is_drowsy: false,
            timestamp_ms: start + 3000,
        })
        .unwrap();
        log.record(StatusRecord::AlarmDeactivated {
            timestamp_ms: start + 3000,
        })
        .unwrap();
    }

    #[test]
    fn test_default_status() {
        let status = HelmetStatus::default();
        assert!(!status.alarm_active);
        assert_eq!(status.events_count, 0);
        assert_eq!(status.last_event_label(), "No events yet");
    }

    #[test]
    fn test_state_change_without_alarm_is_not_counted() {
        let log = MemoryEventLog::new();
        log.record(StatusRecord::DrowsyStateChanged {
            is_drowsy: true,
            timestamp_ms: 100,
        })
        .unwrap();
        let status = log.status();
        assert!(status.is_drowsy);
        assert_eq!(status.events_count, 0);
        assert_eq!(status.last_event, Some(100));
    }

    #[test]
    fn test_alarm_cycle_updates_status() {
        let log = MemoryEventLog::new();
        alarm_cycle(&log, 1_000);

        let status = log.status();
        assert!(!status.is_drowsy);
        assert!(!status.alarm_active);
        assert_eq!(status.events_count, 1);
        assert_eq!(status.last_event, Some(4_000));
        assert_eq!(log.records().len(), 5);
    }

    #[test]
    fn test_jsonl_log_persists_and_replays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let log = JsonlEventLog::open(&path).unwrap();
            alarm_cycle(&log, 10_000);
            assert_eq!(log.status().events_count, 1);
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 5);
        assert!(content.lines().nth(2).unwrap().contains("\"event\":\"drowsiness_event\""));

        let log = JsonlEventLog::open(&path).unwrap();
        assert_eq!(log.status().events_count, 1);
        alarm_cycle(&log, 20_000);
        assert_eq!(log.status().events_count, 2);
        assert_eq!(JsonlEventLog::read_records(&path).unwrap().len(), 10);
    }

    #[test]
    fn test_jsonl_malformed_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"event\":\"alarm_activated\",\"timestamp_ms\":1}\nnot json\n").unwrap();

        match JsonlEventLog::open(&path) {
            Err(EventLogError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("Expected malformed error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_record_timestamp() {
        let record = StatusRecord::AlarmDeactivated { timestamp_ms: 42 };
        assert_eq!(record.timestamp_ms(), 42);
    }
}
