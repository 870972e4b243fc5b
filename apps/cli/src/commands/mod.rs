//! 命令定义和实现

pub mod config;
pub mod detect;
pub mod health;
pub mod monitor;
pub mod tones;

pub use config::ConfigCommand;
pub use detect::DetectCommand;
pub use health::HealthCommand;
pub use monitor::MonitorCommand;
pub use tones::TonesCommand;
