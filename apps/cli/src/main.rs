//! # Helmet CLI
//!
//! Command-line interface for the smart helmet drowsiness detection session.
//!
//! ## 常用命令
//!
//! ```bash
//! # 配置检测服务器地址（写入 ~/.config/smart-helmet/config.toml）
//! helmet-cli config set server.url 192.168.43.151:5000
//!
//! # 检查服务器是否在线
//! helmet-cli health
//!
//! # 单次检测（或上传一张图片检测）
//! helmet-cli detect
//! helmet-cli detect --image face.jpg
//!
//! # 持续监控，困倦时终端响铃，Ctrl+C 退出
//! helmet-cli monitor
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod alarm;
mod commands;
mod utils;

use commands::{ConfigCommand, DetectCommand, HealthCommand, MonitorCommand, TonesCommand};
use utils::CliContext;

/// Helmet CLI - 智能头盔困倦检测命令行工具
#[derive(Parser, Debug)]
#[command(name = "helmet-cli")]
#[command(about = "Command-line interface for the smart helmet drowsiness detection session", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/smart-helmet/config.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 检测服务器地址（覆盖配置文件）
    #[arg(short, long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 检查检测服务器是否在线
    Health {
        #[command(flatten)]
        args: HealthCommand,
    },

    /// 执行一次检测
    Detect {
        #[command(flatten)]
        args: DetectCommand,
    },

    /// 持续监控困倦状态
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 列出报警提示音
    Tones {
        #[command(flatten)]
        args: TonesCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("helmet_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = CliContext::new(cli.config, cli.server)?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&ctx),
        Commands::Health { args } => args.execute(&ctx),
        Commands::Detect { args } => args.execute(&ctx),
        Commands::Monitor { args } => args.execute(&ctx),
        Commands::Tones { args } => args.execute(),
    }
}
