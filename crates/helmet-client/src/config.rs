//! 会话配置与服务器地址持久化

use crate::machine::DebounceConfig;
use helmet_driver::{PollerConfig, RetryPolicy, StreamConfig, TransportConfig};
use helmet_protocol::ServerEndpoint;
use helmet_tools::{AlertTone, ConfigError, HelmetConfig};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 会话运行时配置
///
/// 默认值即产品参数：握手 5 次 × 2000ms，轮询 200ms，去抖 300ms，
/// 报警阈值 1500ms，视频流 500ms 限速 / 3s 重连。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub retry: RetryPolicy,
    pub poller: PollerConfig,
    pub stream: StreamConfig,
    pub debounce: DebounceConfig,
    pub transport: TransportConfig,
    /// 报警提示音
    pub tone: AlertTone,
    /// 关闭时等待工作线程退出的上限
    pub shutdown_timeout: Duration,
    /// 控制命令（start/stop/set_endpoint）等待协调线程确认的上限
    pub control_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poller: PollerConfig::default(),
            stream: StreamConfig::default(),
            debounce: DebounceConfig::default(),
            transport: TransportConfig::default(),
            tone: AlertTone::default(),
            shutdown_timeout: Duration::from_secs(2),
            control_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// 在默认值上应用配置文件中的覆盖项
    pub fn from_file_config(file: &HelmetConfig) -> Self {
        let mut config = Self::default();
        let timing = &file.timing;

        if let Some(ms) = timing.debounce_ms {
            config.debounce.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.alarm_threshold_ms {
            config.debounce.alarm_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.poll_interval_ms {
            config.poller.interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = timing.retry_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = timing.retry_delay_ms {
            config.retry.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.stream_reconnect_ms {
            config.stream.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = timing.min_display_interval_ms {
            config.stream.min_display_interval = Duration::from_millis(ms);
        }

        config.poller.route = file.server.detection_route;
        config.tone = file.alert.tone;
        config
    }
}

/// 服务器地址的持久化存储
pub trait EndpointStore: Send + Sync {
    fn save(&self, endpoint: &ServerEndpoint) -> Result<(), ConfigError>;
}

/// 写回 TOML 配置文件（保留文件中的其他设置）
#[derive(Debug, Clone)]
pub struct FileEndpointStore {
    path: PathBuf,
}

impl FileEndpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取已保存的地址（未配置时为 `None`）
    pub fn load(&self) -> Result<Option<ServerEndpoint>, ConfigError> {
        let config = HelmetConfig::load_from_file(&self.path)?;
        match config.server.url {
            Some(_) => config.endpoint().map(Some),
            None => Ok(None),
        }
    }
}

impl EndpointStore for FileEndpointStore {
    fn save(&self, endpoint: &ServerEndpoint) -> Result<(), ConfigError> {
        let mut config = HelmetConfig::load_from_file(&self.path)?;
        config.set_endpoint(endpoint);
        config.save_to_file(&self.path)
    }
}

/// 内存存储（测试或不需要持久化的场景）
#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    saved: Mutex<Option<ServerEndpoint>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<ServerEndpoint> {
        self.saved.lock().clone()
    }
}

impl EndpointStore for MemoryEndpointStore {
    fn save(&self, endpoint: &ServerEndpoint) -> Result<(), ConfigError> {
        *self.saved.lock() = Some(endpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmet_protocol::DetectionRoute;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_delay, Duration::from_millis(2000));
        assert_eq!(config.poller.interval, Duration::from_millis(200));
        assert_eq!(config.debounce.debounce, Duration::from_millis(300));
        assert_eq!(config.debounce.alarm_threshold, Duration::from_millis(1500));
        assert_eq!(config.stream.reconnect_delay, Duration::from_secs(3));
    }

    #[test]
    fn test_file_overrides() {
        let mut file = HelmetConfig::default();
        file.timing.alarm_threshold_ms = Some(2000);
        file.timing.retry_attempts = Some(3);
        file.server.detection_route = DetectionRoute::Full;
        file.alert.tone = AlertTone::ContinuousBeep;

        let config = SessionConfig::from_file_config(&file);
        assert_eq!(config.debounce.alarm_threshold, Duration::from_millis(2000));
        assert_eq!(config.debounce.debounce, Duration::from_millis(300));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.poller.route, DetectionRoute::Full);
        assert_eq!(config.tone, AlertTone::ContinuousBeep);
    }

    #[test]
    fn test_file_store_keeps_other_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut file = HelmetConfig::default();
        file.alert.tone = AlertTone::PulseAlert;
        file.save_to_file(&path).unwrap();

        let store = FileEndpointStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        let endpoint = ServerEndpoint::parse("10.1.1.1:5000").unwrap();
        store.save(&endpoint).unwrap();

        assert_eq!(store.load().unwrap(), Some(endpoint));
        let reloaded = HelmetConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded.alert.tone, AlertTone::PulseAlert);
    }
}
