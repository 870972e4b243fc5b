//! 健康检查命令
//!
//! 按配置的重试策略执行一轮握手，打印服务器状态。

use crate::utils::CliContext;
use anyhow::{Result, bail};
use arc_swap::ArcSwap;
use clap::Args;
use helmet_sdk::driver::{
    CancelToken, HealthClient, SessionMetrics, SystemClock, UreqTransport,
};
use helmet_sdk::protocol::HealthReport;
use std::sync::Arc;

/// 健康检查参数
#[derive(Args, Debug)]
pub struct HealthCommand {
    /// 最大尝试次数（覆盖配置）
    #[arg(short, long)]
    pub attempts: Option<u32>,
}

impl HealthCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let file = ctx.load_config()?;
        let endpoint = ctx.endpoint(&file)?;
        let mut config = ctx.session_config(&file);
        if let Some(attempts) = self.attempts {
            config.retry.max_attempts = attempts.max(1);
        }

        println!(
            "⏳ 连接 {} (最多 {} 次)...",
            endpoint, config.retry.max_attempts
        );

        let client = HealthClient::new(
            Arc::new(UreqTransport::new(config.transport)),
            Arc::new(SystemClock),
            Arc::new(SessionMetrics::new()),
        );
        let live = ArcSwap::from_pointee(endpoint.clone());
        let result = client.attempt_connect(&endpoint, &live, &config.retry, &CancelToken::new());

        if !result.success() {
            bail!("{}", result.detail);
        }

        println!("✅ {} (第 {} 次尝试)", result.detail, result.attempts);
        if let Some(report) = &result.health {
            print_report(report);
        }
        Ok(())
    }
}

fn print_report(report: &HealthReport) {
    let flag = |value: Option<bool>| match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    };

    match &report.status {
        Some(status) => {
            println!("  状态:     {}", status);
            println!("  模型加载: {}", flag(report.detector_loaded));
            println!("  摄像头:   {}", flag(report.camera_active));
            if let Some(model) = &report.model_path {
                println!("  模型路径: {}", model);
            }
        },
        None => println!("  响应: {}", report.raw.trim()),
    }

    if !report.is_ready() {
        println!("⚠️  服务器在线，但检测尚未就绪");
    }
}
