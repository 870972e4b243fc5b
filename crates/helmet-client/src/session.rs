//! 会话协调器
//!
//! `helmet-coordinator` 线程是 [`ConnectionState`] 唯一的写入者，按顺序编排：
//!
//! ```text
//! start() ──▶ Connecting ──(helmet-connector: 有限重试握手)──▶ Connected ──▶ helmet-poller
//!                  │                                              └──────▶ helmet-stream（画面存在时）
//!                  └──▶ Failed（通知一次）
//! stop() / 重新配置 / 视频流致命错误 ──▶ 取消全部工作线程，状态机复位 ──▶ Disconnected
//! ```
//!
//! # 围栏
//!
//! 每一轮连接都有一个递增的代号（generation）。工作线程带着代号上报结果，
//! 协调线程只接受当前代号的消息；代号在拆除时先递增，之后到达的握手结果、
//! 检测采样和视频帧全部被丢弃。握手本身还会对比实时地址（[`ArcSwap`]），
//! 地址一变，正在进行的尝试立即作废，协调线程随即对新地址开始新一轮握手。
//!
//! # 注意
//!
//! Sink 回调运行在协调线程或定时器线程上，不要在回调里调用
//! `start`/`stop`/`set_endpoint`（会等待自身确认直到超时）。

use crate::actuator::AlarmActuator;
use crate::config::{EndpointStore, SessionConfig};
use crate::error::SessionError;
use crate::machine::AlarmPhase;
use crate::timer::{AlarmTimerQueue, SampleSender};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use helmet_driver::{
    AtomicConnectionState, CancelToken, Clock, ConnectOutcome, ConnectionResult, ConnectionState,
    DetectionPoller, DetectionSample, DriverError, FrameCodec, HealthClient, HelmetTransport,
    JoinTimeout, MetricsSnapshot, SessionMetrics, SessionSink, SinkManager, StreamExit, StreamPump,
    spawn_named,
};
use helmet_protocol::ServerEndpoint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 会话内各线程共享的状态（全部无锁）
struct Shared {
    endpoint: ArcSwap<ServerEndpoint>,
    state: AtomicConnectionState,
    generation: AtomicU64,
    polling_enabled: AtomicBool,
    metrics: Arc<SessionMetrics>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

enum Command {
    Start { ack: Sender<()> },
    Stop { ack: Sender<()> },
    Restart { ack: Sender<()> },
    Surface { active: bool, ack: Sender<()> },
    ConnectFinished { generation: u64, result: ConnectionResult },
    StreamFailed { generation: u64, error: DriverError },
    Shutdown,
}

/// 构建会话所需的全部组件（由 [`SessionBuilder`](crate::SessionBuilder) 组装）
pub(crate) struct SessionParts {
    pub endpoint: ServerEndpoint,
    pub config: SessionConfig,
    pub transport: Arc<dyn HelmetTransport>,
    pub clock: Arc<dyn Clock>,
    pub codec: Arc<dyn FrameCodec>,
    pub actuator: Arc<dyn AlarmActuator>,
    pub endpoint_store: Option<Arc<dyn EndpointStore>>,
    pub sinks: SinkManager,
    pub surface_active: bool,
}

/// 远程检测会话
///
/// # 使用示例
///
/// ```no_run
/// use helmet_client::SessionBuilder;
/// use helmet_driver::ConnectionState;
/// use std::time::Duration;
///
/// let session = SessionBuilder::new()
///     .endpoint("192.168.43.151:5000")
///     .build()
///     .unwrap();
///
/// session.start().unwrap();
/// if session.wait_for_state(ConnectionState::Connected, Duration::from_secs(15)) {
///     println!("connected to {}", session.endpoint());
/// }
/// session.stop().unwrap();
/// ```
pub struct HelmetSession {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    timer: Arc<AlarmTimerQueue>,
    poller: Arc<DetectionPoller>,
    endpoint_store: Option<Arc<dyn EndpointStore>>,
    control_timeout: Duration,
    coordinator: Option<JoinHandle<()>>,
}

impl HelmetSession {
    pub(crate) fn spawn(parts: SessionParts) -> Result<Self, SessionError> {
        let SessionParts {
            endpoint,
            config,
            transport,
            clock,
            codec,
            actuator,
            endpoint_store,
            sinks,
            surface_active,
        } = parts;

        let metrics = Arc::new(SessionMetrics::new());
        let shared = Arc::new(Shared {
            endpoint: ArcSwap::from_pointee(endpoint),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
            polling_enabled: AtomicBool::new(true),
            metrics: metrics.clone(),
        });

        let timer = Arc::new(AlarmTimerQueue::spawn(
            config.debounce,
            config.tone,
            clock.clone(),
            sinks.clone(),
            actuator,
            metrics.clone(),
        )?);

        let health = Arc::new(HealthClient::new(transport.clone(), clock.clone(), metrics.clone()));
        let poller = Arc::new(DetectionPoller::new(
            transport.clone(),
            clock.clone(),
            config.poller,
            metrics.clone(),
        ));
        let pump = Arc::new(StreamPump::new(
            transport,
            codec,
            clock,
            config.stream,
            metrics,
        ));

        let (tx, rx) = unbounded();
        let coordinator = Coordinator {
            shared: shared.clone(),
            timer: timer.clone(),
            samples: timer.sender(),
            health,
            poller: poller.clone(),
            pump,
            sinks,
            config,
            commands: tx.clone(),
            cycle: None,
            surface_active,
        };
        let handle = spawn_named("helmet-coordinator", move || coordinator.run(rx))?;

        Ok(Self {
            shared,
            commands: tx,
            timer,
            poller,
            endpoint_store,
            control_timeout: config.control_timeout,
            coordinator: Some(handle),
        })
    }

    /// 修改服务器地址
    ///
    /// - 地址先规范化；为空或非法时立即返回 [`SessionError::InvalidEndpoint`]，不做任何改动
    /// - `persist`: 写入地址存储（未配置存储时忽略）
    /// - `restart_now`: 拆除当前连接并立即对新地址握手；否则已建立的连接保持不变，
    ///   新地址在下一次 `start()` 时生效。正在进行的握手无论哪种情况都会作废，
    ///   并立即改为对新地址握手
    pub fn set_endpoint(
        &self,
        url: &str,
        persist: bool,
        restart_now: bool,
    ) -> Result<ServerEndpoint, SessionError> {
        let endpoint = ServerEndpoint::parse(url)?;

        if persist {
            match &self.endpoint_store {
                Some(store) => store.save(&endpoint)?,
                None => debug!("No endpoint store configured, {} not persisted", endpoint),
            }
        }

        info!("Server endpoint set to {}", endpoint);
        self.shared.endpoint.store(Arc::new(endpoint.clone()));

        if restart_now {
            self.request("restart", |ack| Command::Restart { ack })?;
        }
        Ok(endpoint)
    }

    /// 开始连接（已在连接或已连接时无操作）
    ///
    /// 返回时状态已进入 `Connecting`，握手结果通过 sink 异步通知。
    pub fn start(&self) -> Result<(), SessionError> {
        self.request("start", |ack| Command::Start { ack })
    }

    /// 停止会话（幂等，任何状态下都可调用）
    ///
    /// 返回时所有工作线程已取消，报警已同步关闭，之后不会再有报警触发。
    pub fn stop(&self) -> Result<(), SessionError> {
        self.request("stop", |ack| Command::Stop { ack })
    }

    /// 显示画面已创建：连接状态下启动视频流
    pub fn surface_created(&self) -> Result<(), SessionError> {
        self.request("surface_created", |ack| Command::Surface { active: true, ack })
    }

    /// 显示画面已销毁：停止视频流（检测轮询继续）
    pub fn surface_destroyed(&self) -> Result<(), SessionError> {
        self.request("surface_destroyed", |ack| Command::Surface {
            active: false,
            ack,
        })
    }

    /// 暂停/恢复检测轮询
    pub fn set_polling_enabled(&self, enabled: bool) {
        self.shared.polling_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_polling_enabled(&self) -> bool {
        self.shared.polling_enabled.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get(Ordering::Acquire)
    }

    /// 当前配置的服务器地址
    pub fn endpoint(&self) -> ServerEndpoint {
        (**self.shared.endpoint.load()).clone()
    }

    pub fn alarm_phase(&self) -> AlarmPhase {
        self.timer.phase()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 用一张图片做一次检测（`POST /detect`，在调用线程上阻塞执行）
    ///
    /// 结果不进入去抖状态机。
    pub fn detect_image(&self, jpeg: &[u8]) -> Result<DetectionSample, SessionError> {
        Ok(self.poller.detect_image(&self.endpoint(), jpeg)?)
    }

    /// 等待连接状态变为 `target`
    pub fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() == target {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn request(
        &self,
        what: &'static str,
        make: impl FnOnce(Sender<()>) -> Command,
    ) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = bounded(1);
        self.commands
            .send(make(ack_tx))
            .map_err(|_| SessionError::ShutDown)?;
        ack_rx
            .recv_timeout(self.control_timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => SessionError::Timeout(what),
                RecvTimeoutError::Disconnected => SessionError::ShutDown,
            })
    }
}

impl Drop for HelmetSession {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.coordinator.take()
            && handle.join_timeout(self.control_timeout).is_err()
        {
            warn!("Session coordinator did not exit within {:?}", self.control_timeout);
        }
    }
}

struct StreamWorker {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// 一轮连接（Connecting 或 Connected 期间存在）
struct Cycle {
    generation: u64,
    endpoint: ServerEndpoint,
    cancel: CancelToken,
    connector: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    stream: Option<StreamWorker>,
}

struct Coordinator {
    shared: Arc<Shared>,
    timer: Arc<AlarmTimerQueue>,
    samples: SampleSender,
    health: Arc<HealthClient>,
    poller: Arc<DetectionPoller>,
    pump: Arc<StreamPump>,
    sinks: SinkManager,
    config: SessionConfig,
    commands: Sender<Command>,
    cycle: Option<Cycle>,
    surface_active: bool,
}

impl Coordinator {
    fn run(mut self, rx: Receiver<Command>) {
        debug!("Session coordinator started");

        while let Ok(command) = rx.recv() {
            match command {
                Command::Start { ack } => {
                    if self.cycle.is_none() {
                        self.start_cycle();
                    } else {
                        debug!("Start ignored: session already {}", self.state());
                    }
                    let _ = ack.send(());
                },
                Command::Stop { ack } => {
                    self.teardown();
                    let _ = ack.send(());
                },
                Command::Restart { ack } => {
                    self.teardown();
                    self.start_cycle();
                    let _ = ack.send(());
                },
                Command::Surface { active, ack } => {
                    self.set_surface(active);
                    let _ = ack.send(());
                },
                Command::ConnectFinished { generation, result } => {
                    self.on_connect_finished(generation, result);
                },
                Command::StreamFailed { generation, error } => {
                    self.on_stream_failed(generation, error);
                },
                Command::Shutdown => break,
            }
        }

        self.teardown();
        debug!("Session coordinator stopped");
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.get(Ordering::Acquire)
    }

    fn set_state(&self, next: ConnectionState) {
        let current = self.state();
        if current == next {
            return;
        }
        if self.shared.state.transition(next) {
            info!("Connection state: {} -> {}", current, next);
            self.sinks.on_connection_state_changed(next);
        } else {
            error!("Illegal connection state transition {} -> {}", current, next);
        }
    }

    fn start_cycle(&mut self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.timer.reset(generation, self.config.control_timeout) {
            warn!("Timer queue did not acknowledge reset for generation {}", generation);
        }

        let endpoint = (**self.shared.endpoint.load()).clone();
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to {}", endpoint);

        let cancel = CancelToken::new();
        let connector = {
            let shared = self.shared.clone();
            let health = self.health.clone();
            let commands = self.commands.clone();
            let retry = self.config.retry;
            let endpoint = endpoint.clone();
            let cancel = cancel.clone();
            spawn_named("helmet-connector", move || {
                let result = health.attempt_connect(&endpoint, &shared.endpoint, &retry, &cancel);
                let _ = commands.send(Command::ConnectFinished { generation, result });
            })
        };

        match connector {
            Ok(handle) => {
                self.cycle = Some(Cycle {
                    generation,
                    endpoint,
                    cancel,
                    connector: Some(handle),
                    poller: None,
                    stream: None,
                });
            },
            Err(e) => {
                error!("Failed to start connector: {}", e);
                self.set_state(ConnectionState::Failed);
                self.sinks.on_connection_failed(&e.to_string());
            },
        }
    }

    fn on_connect_finished(&mut self, generation: u64, result: ConnectionResult) {
        let Some(cycle) = self.cycle.as_mut().filter(|c| c.generation == generation) else {
            debug!(
                "Dropping connect result for stale generation {} ({:?})",
                generation, result.outcome
            );
            return;
        };
        if let Some(handle) = cycle.connector.take() {
            join_worker(handle, "helmet-connector", self.config.shutdown_timeout);
        }

        match result.outcome {
            ConnectOutcome::Connected => {
                info!(
                    "Connected to {} after {} attempt(s)",
                    result.endpoint, result.attempts
                );
                if let Some(report) = &result.health {
                    debug!("Server health: {:?}", report);
                }
                self.set_state(ConnectionState::Connected);
                self.spawn_poller();
                if self.surface_active {
                    self.spawn_stream();
                }
            },
            ConnectOutcome::Failed => {
                warn!(
                    "Connection to {} failed after {} attempt(s): {}",
                    result.endpoint, result.attempts, result.detail
                );
                self.cycle = None;
                self.set_state(ConnectionState::Failed);
                // 每轮握手只通知一次
                self.sinks.on_connection_failed(&result.detail);
            },
            ConnectOutcome::Superseded => {
                // 旧地址的结果不改动状态，直接对新地址开始新一轮握手（保持 Connecting）
                let live = self.shared.endpoint.load();
                debug!(
                    "Connect to {} superseded by {} after {} attempt(s), reconnecting",
                    result.endpoint,
                    live.as_str(),
                    result.attempts
                );
                self.cycle = None;
                self.start_cycle();
            },
            ConnectOutcome::Cancelled => {
                debug!(
                    "Connect to {} cancelled after {} attempt(s)",
                    result.endpoint, result.attempts
                );
                self.cycle = None;
                self.set_state(ConnectionState::Disconnected);
            },
        }
    }

    fn spawn_poller(&mut self) {
        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };
        let generation = cycle.generation;
        let shared = self.shared.clone();
        let poller = self.poller.clone();
        let sinks = self.sinks.clone();
        let samples = self.samples.clone();
        let endpoint = cycle.endpoint.clone();
        let cancel = cycle.cancel.clone();

        let spawned = spawn_named("helmet-poller", move || {
            poller.run(
                &endpoint,
                &cancel,
                || shared.polling_enabled.load(Ordering::Acquire),
                |sample| {
                    if !shared.is_current(generation) {
                        return;
                    }
                    sinks.on_detection(&sample);
                    samples.submit(generation, &sample);
                },
            );
        });

        match spawned {
            Ok(handle) => cycle.poller = Some(handle),
            Err(e) => error!("Failed to start detection poller: {}", e),
        }
    }

    fn spawn_stream(&mut self) {
        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };
        if cycle.stream.is_some() {
            return;
        }
        let generation = cycle.generation;
        let shared = self.shared.clone();
        let pump = self.pump.clone();
        let sinks = self.sinks.clone();
        let commands = self.commands.clone();
        let endpoint = cycle.endpoint.clone();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let spawned = spawn_named("helmet-stream", move || {
            let exit = pump.run(&endpoint, &worker_cancel, |frame| {
                if shared.is_current(generation) {
                    sinks.on_frame(&frame);
                }
            });
            if let StreamExit::Fatal(error) = exit {
                let _ = commands.send(Command::StreamFailed { generation, error });
            }
        });

        match spawned {
            Ok(handle) => cycle.stream = Some(StreamWorker { cancel, handle }),
            Err(e) => error!("Failed to start stream pump: {}", e),
        }
    }

    fn set_surface(&mut self, active: bool) {
        self.surface_active = active;
        if active {
            if self.state() == ConnectionState::Connected {
                self.spawn_stream();
            }
        } else if let Some(stream) = self.cycle.as_mut().and_then(|c| c.stream.take()) {
            stream.cancel.cancel();
            join_worker(stream.handle, "helmet-stream", self.config.shutdown_timeout);
        }
    }

    fn on_stream_failed(&mut self, generation: u64, error: DriverError) {
        if !self.cycle.as_ref().is_some_and(|c| c.generation == generation) {
            return;
        }
        warn!("Stream failed permanently, disconnecting: {}", error);
        self.teardown();
        self.sinks.on_connection_failed(&error.to_string());
    }

    /// 拆除当前连接：先作废代号，再取消并回收全部工作线程，最后同步复位报警
    fn teardown(&mut self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(mut cycle) = self.cycle.take() {
            debug!("Tearing down connection to {}", cycle.endpoint);
            cycle.cancel.cancel();
            let stream = cycle.stream.take();
            if let Some(stream) = &stream {
                stream.cancel.cancel();
            }

            let timeout = self.config.shutdown_timeout;
            if let Some(handle) = cycle.connector.take() {
                join_worker(handle, "helmet-connector", timeout);
            }
            if let Some(handle) = cycle.poller.take() {
                join_worker(handle, "helmet-poller", timeout);
            }
            if let Some(stream) = stream {
                join_worker(stream.handle, "helmet-stream", timeout);
            }
        }

        self.set_state(ConnectionState::Disconnected);

        if !self.timer.reset(generation, self.config.control_timeout) {
            warn!("Timer queue did not acknowledge reset for generation {}", generation);
        }
    }
}

/// 回收工作线程；超时的线程被放弃（其结果已被代号围栏屏蔽）
fn join_worker(handle: JoinHandle<()>, name: &str, timeout: Duration) {
    if handle.join_timeout(timeout).is_err() {
        warn!("{} did not exit within {:?}, abandoning it", name, timeout);
    }
}
