//! # 持久化配置
//!
//! 应用配置保存在 TOML 文件中：
//! - Linux: `~/.config/smart-helmet/config.toml`
//! - macOS: `~/Library/Application Support/smart-helmet/config.toml`
//! - Windows: `%APPDATA%\smart-helmet\config.toml`
//!
//! 路径由应用层（`dirs::config_dir()`）解析，本模块只负责读写和校验。
//!
//! ```toml
//! [server]
//! url = "http://192.168.43.151:5000"
//! detection_route = "simple"
//!
//! [alert]
//! tone = "emergency-siren"
//! vibrate = true
//!
//! [timing]
//! debounce_ms = 300
//! alarm_threshold_ms = 1500
//! ```

use crate::tones::AlertTone;
use helmet_protocol::{DetectionRoute, ProtocolError, ServerEndpoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 配置目录名（位于系统配置目录下）
pub const CONFIG_DIR_NAME: &str = "smart-helmet";

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 可通过 `set_value`/`get_value` 访问的键
pub const CONFIG_KEYS: &[&str] = &[
    "server.url",
    "server.detection_route",
    "alert.tone",
    "alert.vibrate",
    "timing.debounce_ms",
    "timing.alarm_threshold_ms",
    "timing.poll_interval_ms",
    "timing.retry_attempts",
    "timing.retry_delay_ms",
    "timing.stream_reconnect_ms",
    "timing.min_display_interval_ms",
];

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    InvalidEndpoint(#[from] ProtocolError),

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// 应用配置（对应一个 TOML 文件）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    pub server: ServerSection,
    pub alert: AlertSection,
    pub timing: TimingOverrides,
}

/// `[server]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// 服务器地址（未设置时使用内置默认地址）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 轮询使用的检测接口
    pub detection_route: DetectionRoute,
}

/// `[alert]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSection {
    pub tone: AlertTone,
    /// 报警时是否同时振动
    pub vibrate: bool,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            tone: AlertTone::default(),
            vibrate: true,
        }
    }
}

/// `[timing]`：全部可选，未设置的项使用运行时默认值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_threshold_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_reconnect_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_display_interval_ms: Option<u64>,
}

impl HelmetConfig {
    /// 从文件加载配置
    ///
    /// 文件不存在时返回默认配置（首次运行）。
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            },
        };
        let config: HelmetConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 保存配置（自动创建父目录）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = toml::to_string_pretty(self)?;
        let content = format!("# Smart Helmet configuration\n\n{}", body);
        fs::write(path, content).map_err(io_err)
    }

    /// 服务器地址（未配置时为默认地址）
    pub fn endpoint(&self) -> Result<ServerEndpoint, ConfigError> {
        match &self.server.url {
            Some(url) => Ok(ServerEndpoint::parse(url)?),
            None => Ok(ServerEndpoint::default()),
        }
    }

    /// 设置服务器地址（保存规范化后的形式）
    pub fn set_endpoint(&mut self, endpoint: &ServerEndpoint) {
        self.server.url = Some(endpoint.as_str().to_string());
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        let t = &self.timing;
        let positive = [
            ("timing.poll_interval_ms", t.poll_interval_ms),
            ("timing.alarm_threshold_ms", t.alarm_threshold_ms),
            ("timing.retry_attempts", t.retry_attempts.map(u64::from)),
        ];
        for (key, value) in positive {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 按键名读取（`config get`）
    pub fn get_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let t = &self.timing;
        let value = match key {
            "server.url" => self.server.url.clone(),
            "server.detection_route" => Some(route_name(self.server.detection_route).to_string()),
            "alert.tone" => Some(self.alert.tone.key().to_string()),
            "alert.vibrate" => Some(self.alert.vibrate.to_string()),
            "timing.debounce_ms" => t.debounce_ms.map(|v| v.to_string()),
            "timing.alarm_threshold_ms" => t.alarm_threshold_ms.map(|v| v.to_string()),
            "timing.poll_interval_ms" => t.poll_interval_ms.map(|v| v.to_string()),
            "timing.retry_attempts" => t.retry_attempts.map(|v| v.to_string()),
            "timing.retry_delay_ms" => t.retry_delay_ms.map(|v| v.to_string()),
            "timing.stream_reconnect_ms" => t.stream_reconnect_ms.map(|v| v.to_string()),
            "timing.min_display_interval_ms" => t.min_display_interval_ms.map(|v| v.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// 按键名写入（`config set`）
    ///
    /// `server.url` 会先规范化再保存，非法地址直接报错。
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let millis = || value.trim().parse::<u64>().map_err(|_| invalid());

        match key {
            "server.url" => {
                let endpoint = ServerEndpoint::parse(value)?;
                self.set_endpoint(&endpoint);
            },
            "server.detection_route" => {
                self.server.detection_route = match value.trim() {
                    "simple" | "/detect_simple" => DetectionRoute::Simple,
                    "full" | "/detect" => DetectionRoute::Full,
                    _ => return Err(invalid()),
                };
            },
            "alert.tone" => self.alert.tone = value.parse().map_err(|_| invalid())?,
            "alert.vibrate" => self.alert.vibrate = value.trim().parse().map_err(|_| invalid())?,
            "timing.debounce_ms" => self.timing.debounce_ms = Some(millis()?),
            "timing.alarm_threshold_ms" => self.timing.alarm_threshold_ms = Some(millis()?),
            "timing.poll_interval_ms" => self.timing.poll_interval_ms = Some(millis()?),
            "timing.retry_attempts" => {
                self.timing.retry_attempts = Some(value.trim().parse().map_err(|_| invalid())?)
            },
            "timing.retry_delay_ms" => self.timing.retry_delay_ms = Some(millis()?),
            "timing.stream_reconnect_ms" => self.timing.stream_reconnect_ms = Some(millis()?),
            "timing.min_display_interval_ms" => {
                self.timing.min_display_interval_ms = Some(millis()?)
            },
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn route_name(route: DetectionRoute) -> &'static str {
    match route {
        DetectionRoute::Simple => "simple",
        DetectionRoute::Full => "full",
    }
}
