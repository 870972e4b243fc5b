//! 单次检测命令

use crate::utils::CliContext;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use helmet_sdk::driver::{
    DetectionPoller, DetectionSample, SessionMetrics, SystemClock, UreqTransport,
};
use helmet_sdk::protocol::DetectionRoute;
use std::path::PathBuf;
use std::sync::Arc;

/// 检测接口
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum RouteArg {
    /// `/detect_simple`
    Simple,
    /// `/detect`（带检测框）
    Full,
}

impl From<RouteArg> for DetectionRoute {
    fn from(route: RouteArg) -> Self {
        match route {
            RouteArg::Simple => DetectionRoute::Simple,
            RouteArg::Full => DetectionRoute::Full,
        }
    }
}

/// 检测命令参数
#[derive(Args, Debug)]
pub struct DetectCommand {
    /// 上传一张 JPEG 图片检测（POST /detect）
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// 轮询使用的检测接口（覆盖配置）
    #[arg(short, long, value_enum)]
    pub route: Option<RouteArg>,
}

impl DetectCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let file = ctx.load_config()?;
        let endpoint = ctx.endpoint(&file)?;
        let mut config = ctx.session_config(&file);
        if let Some(route) = self.route {
            config.poller.route = route.into();
        }

        let poller = DetectionPoller::new(
            Arc::new(UreqTransport::new(config.transport)),
            Arc::new(SystemClock),
            config.poller,
            Arc::new(SessionMetrics::new()),
        );

        let sample = match &self.image {
            Some(path) => {
                let jpeg = std::fs::read(path)
                    .with_context(|| format!("读取图片失败: {}", path.display()))?;
                println!("⏳ 上传 {} ({} 字节) 到 {}", path.display(), jpeg.len(), endpoint);
                poller.detect_image(&endpoint, &jpeg)?
            },
            None => {
                println!("⏳ 请求 {}", endpoint.join(config.poller.route.path()));
                poller.poll_once(&endpoint)?
            },
        };

        print_sample(&sample);
        Ok(())
    }
}

fn print_sample(sample: &DetectionSample) {
    if sample.is_drowsy {
        println!("😴 困倦 (置信度 {:.2})", sample.confidence);
    } else {
        println!("🙂 清醒 (置信度 {:.2})", sample.confidence);
    }

    for (i, detection) in sample.detections.iter().enumerate() {
        let b = &detection.bbox;
        println!(
            "  [{}] {} {:.2} @ ({:.0}, {:.0}) - ({:.0}, {:.0})",
            i, detection.label, detection.confidence, b.x1, b.y1, b.x2, b.y2
        );
    }
}
