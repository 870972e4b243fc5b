//! # Helmet Tools - 共享配置和状态记录
//!
//! **依赖原则**: 只依赖 `helmet-protocol`，不依赖 `helmet-driver`/`helmet-client`
//!
//! ## 包含模块
//!
//! - `config` - TOML 配置文件（服务器地址、提示音、时间参数覆盖）
//! - `tones` - 报警提示音及对应振动模式
//! - `status` - 头盔状态汇总与事件日志（内存 / JSON Lines）

// ⚠️ 禁止引入 helmet-client
// use helmet_client::*;  // ❌ 禁止

pub mod config;
pub mod status;
pub mod tones;

// 重新导出常用类型
pub use config::{
    AlertSection, CONFIG_DIR_NAME, CONFIG_FILE_NAME, CONFIG_KEYS, ConfigError, HelmetConfig,
    ServerSection, TimingOverrides,
};
pub use status::{
    EventLog, EventLogError, HelmetStatus, JsonlEventLog, MemoryEventLog, StatusRecord,
};
pub use tones::{AlertTone, UnknownTone, VibrationPattern};
