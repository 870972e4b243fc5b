//! 命令共用的上下文：配置文件路径、服务器地址解析

use anyhow::{Context, Result};
use helmet_sdk::tools::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use helmet_sdk::{DEFAULT_ENDPOINT, HelmetConfig, ServerEndpoint, SessionConfig};
use std::path::{Path, PathBuf};

/// 事件日志文件名（与配置文件同目录）
const EVENT_LOG_FILE_NAME: &str = "events.jsonl";

/// 默认配置文件路径：`<config_dir>/smart-helmet/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push(CONFIG_DIR_NAME);
    path.push(CONFIG_FILE_NAME);
    Ok(path)
}

/// 命令执行上下文
#[derive(Debug, Clone)]
pub struct CliContext {
    config_path: PathBuf,
    server_override: Option<String>,
}

impl CliContext {
    pub fn new(config_path: Option<PathBuf>, server_override: Option<String>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        Ok(Self {
            config_path,
            server_override,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 加载配置文件（不存在时为默认配置）
    pub fn load_config(&self) -> Result<HelmetConfig> {
        HelmetConfig::load_from_file(&self.config_path)
            .with_context(|| format!("读取配置文件失败: {}", self.config_path.display()))
    }

    /// 服务器地址：命令行 > 配置文件 > 内置默认值
    pub fn endpoint(&self, config: &HelmetConfig) -> Result<ServerEndpoint> {
        let raw = self
            .server_override
            .as_deref()
            .or(config.server.url.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT);
        ServerEndpoint::parse(raw).with_context(|| format!("服务器地址无效: {:?}", raw))
    }

    pub fn session_config(&self, config: &HelmetConfig) -> SessionConfig {
        SessionConfig::from_file_config(config)
    }

    /// 默认事件日志路径
    pub fn default_event_log_path(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(|dir| dir.join(EVENT_LOG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(EVENT_LOG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(dir: &Path, server: Option<&str>) -> CliContext {
        CliContext::new(
            Some(dir.join("config.toml")),
            server.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_precedence() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = HelmetConfig::default();

        let ctx = context(dir.path(), None);
        assert_eq!(ctx.endpoint(&config).unwrap().as_str(), DEFAULT_ENDPOINT);

        config.set_value("server.url", "10.0.0.3:5000").unwrap();
        assert_eq!(ctx.endpoint(&config).unwrap().as_str(), "http://10.0.0.3:5000");

        let ctx = context(dir.path(), Some("10.0.0.4:8080/"));
        assert_eq!(ctx.endpoint(&config).unwrap().as_str(), "http://10.0.0.4:8080");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path(), Some("  "));
        assert!(ctx.endpoint(&HelmetConfig::default()).is_err());
    }

    #[test]
    fn test_event_log_next_to_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = context(dir.path(), None);
        assert_eq!(ctx.default_event_log_path(), dir.path().join("events.jsonl"));
    }
}
