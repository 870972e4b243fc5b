//! 配置管理命令
//!
//! 读写 `config.toml`（服务器地址、提示音、时间参数）

use crate::utils::CliContext;
use anyhow::{Context, Result};
use clap::Subcommand;
use helmet_sdk::HelmetConfig;
use helmet_sdk::tools::CONFIG_KEYS;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 配置项名称（如 server.url, alert.tone, timing.alarm_threshold_ms）
        key: String,

        /// 配置值
        value: String,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Set { key, value } => Self::set_(ctx, &key, &value),

            ConfigCommand::Get { key } => Self::get_(ctx, &key),

            ConfigCommand::Check => Self::check_(ctx),
        }
    }

    fn set_(ctx: &CliContext, key: &str, value: &str) -> Result<()> {
        let mut config = ctx.load_config()?;
        config
            .set_value(key, value)
            .with_context(|| format!("无法设置 {}", key))?;
        config
            .save_to_file(ctx.config_path())
            .context("写入配置文件失败")?;

        let stored = config.get_value(key)?.unwrap_or_default();
        println!("✅ 设置 {} = {}", key, stored);
        Ok(())
    }

    fn get_(ctx: &CliContext, key: &str) -> Result<()> {
        let config = ctx.load_config()?;

        if key != "all" {
            match config.get_value(key)? {
                Some(value) => println!("{}", value),
                None => println!("(未设置)"),
            }
            return Ok(());
        }

        println!("Helmet CLI 配置 ({}):", ctx.config_path().display());
        print_all(&config)?;
        Ok(())
    }

    fn check_(ctx: &CliContext) -> Result<()> {
        println!("检查配置: {}", ctx.config_path().display());

        if !ctx.config_path().exists() {
            println!("⚠️  配置文件不存在，将使用默认值");
        }

        let config = ctx.load_config()?;
        config.validate().context("配置无效")?;

        let endpoint = ctx.endpoint(&config)?;
        println!("✅ 配置有效");
        println!("  服务器: {}", endpoint);
        println!("  提示音: {}", config.alert.tone);
        Ok(())
    }
}

fn print_all(config: &HelmetConfig) -> Result<()> {
    for key in CONFIG_KEYS {
        let value = config
            .get_value(key)?
            .unwrap_or_else(|| "(未设置)".to_string());
        println!("  {:<32} {}", key, value);
    }
    Ok(())
}
