//! 监控命令
//!
//! 运行完整的检测会话，打印去抖后的状态变化和报警，Ctrl+C 退出。

use crate::alarm::TerminalAlarm;
use crate::utils::CliContext;
use anyhow::{Context, Result, bail};
use clap::Args;
use crossbeam_channel::{Receiver, select, tick};
use helmet_sdk::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 运行时长（秒），0 表示直到 Ctrl+C
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// 同时拉取视频流（只统计帧，不显示）
    #[arg(long)]
    pub stream: bool,

    /// 报警提示音（覆盖配置，如 emergency-siren）
    #[arg(short, long)]
    pub tone: Option<AlertTone>,

    /// 事件日志路径（默认与配置文件同目录的 events.jsonl）
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// 不记录事件日志
    #[arg(long, conflicts_with = "log")]
    pub no_log: bool,

    /// 打印统计信息的间隔（秒）
    #[arg(long, default_value_t = 10)]
    pub stats_interval: u64,
}

/// 事件处理后是否继续
enum Flow {
    Continue,
    Failed(String),
}

#[derive(Default)]
struct Counters {
    frames: u64,
    alarms: u64,
}

impl MonitorCommand {
    pub fn execute(&self, ctx: &CliContext) -> Result<()> {
        let file = ctx.load_config()?;
        let endpoint = ctx.endpoint(&file)?;
        let mut config = ctx.session_config(&file);
        if let Some(tone) = self.tone {
            config.tone = tone;
        }

        // 设置 Ctrl+C 处理
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
            println!("\n收到退出信号，正在关闭...");
        })?;

        let (sink, events) = ChannelSink::new(1024);
        let sink = if self.stream { sink } else { sink.without_frames() };

        let mut builder = SessionBuilder::new()
            .endpoint(endpoint.as_str())
            .config(config)
            .actuator(Arc::new(TerminalAlarm::new(file.alert.vibrate)))
            .sink(Arc::new(sink))
            .surface_active(self.stream);

        let log = if self.no_log {
            None
        } else {
            let path = self
                .log
                .clone()
                .unwrap_or_else(|| ctx.default_event_log_path());
            let log = Arc::new(
                JsonlEventLog::open(&path)
                    .with_context(|| format!("打开事件日志失败: {}", path.display()))?,
            );
            let status = log.status();
            println!(
                "📒 事件日志: {} (累计 {} 次困倦事件，最近: {})",
                path.display(),
                status.events_count,
                status.last_event_label()
            );
            builder = builder.event_log(log.clone());
            Some(log)
        };

        let session = builder.build()?;
        println!("⏳ 连接 {} (提示音: {})...", endpoint, config.tone);
        session.start()?;
        println!("按 Ctrl+C 退出\n");

        let outcome = self.event_loop(&session, &events, &running);

        session.stop()?;
        print_summary(&session.metrics(), log.as_deref().map(|l| l.status()));

        match outcome? {
            Flow::Continue => Ok(()),
            Flow::Failed(detail) => bail!("{}", detail),
        }
    }

    fn event_loop(
        &self,
        session: &HelmetSession,
        events: &Receiver<SessionEvent>,
        running: &AtomicBool,
    ) -> Result<Flow> {
        let deadline =
            (self.duration > 0).then(|| Instant::now() + Duration::from_secs(self.duration));
        let stats = tick(Duration::from_secs(self.stats_interval.max(1)));
        let mut counters = Counters::default();

        while running.load(Ordering::SeqCst) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                println!("\n⏱️  达到时长限制");
                break;
            }

            select! {
                recv(events) -> event => {
                    let Ok(event) = event else { break };
                    if let Flow::Failed(detail) = handle_event(event, &mut counters) {
                        return Ok(Flow::Failed(detail));
                    }
                },
                recv(stats) -> _ => print_stats(session, &counters),
                default(Duration::from_millis(200)) => {},
            }
        }

        Ok(Flow::Continue)
    }
}

fn handle_event(event: SessionEvent, counters: &mut Counters) -> Flow {
    match event {
        SessionEvent::Frame(frame) => {
            if counters.frames == 0 {
                println!("🎥 视频流: {}x{}", frame.width(), frame.height());
            }
            counters.frames += 1;
        },
        SessionEvent::Detection(_) => {},
        SessionEvent::DrowsyStateChanged {
            is_drowsy,
            timestamp_ms,
        } => {
            if is_drowsy {
                println!("[{}] 😴 检测到持续困倦", timestamp_ms);
            } else {
                println!("[{}] 🙂 恢复清醒", timestamp_ms);
            }
        },
        SessionEvent::AlarmActivated => {
            counters.alarms += 1;
            println!("🚨 报警开始");
        },
        SessionEvent::AlarmDeactivated => println!("✅ 报警结束"),
        SessionEvent::DrowsinessEventLogged { timestamp_ms } => {
            println!("[{}] 📝 记录困倦事件", timestamp_ms);
        },
        SessionEvent::ConnectionStateChanged(state) => println!("🔌 连接状态: {}", state),
        SessionEvent::ConnectionFailed(detail) => return Flow::Failed(detail),
    }
    Flow::Continue
}

fn print_stats(session: &HelmetSession, counters: &Counters) {
    let m = session.metrics();
    println!(
        "📊 {} | 轮询 {} 成功 / {} 失败 ({:.1}%) | 帧 {} | 报警 {}",
        session.state(),
        m.polls_ok,
        m.polls_failed,
        m.poll_success_rate(),
        counters.frames,
        counters.alarms
    );
}

fn print_summary(metrics: &MetricsSnapshot, status: Option<HelmetStatus>) {
    println!("\n========== 会话统计 ==========");
    println!("握手尝试:   {}", metrics.connect_attempts);
    println!(
        "检测轮询:   {} 成功 / {} 失败",
        metrics.polls_ok, metrics.polls_failed
    );
    println!(
        "视频帧:     {} 接收 / {} 显示 / {} 限速丢弃 / {} 解码失败",
        metrics.frames_received,
        metrics.frames_displayed,
        metrics.frames_rate_limited,
        metrics.frames_decode_failed
    );
    println!("视频重连:   {}", metrics.stream_reconnects);
    println!("报警次数:   {}", metrics.alarms_activated);
    if let Some(status) = status {
        println!(
            "累计事件:   {} (最近: {})",
            status.events_count,
            status.last_event_label()
        );
    }
    println!("==============================");
}
