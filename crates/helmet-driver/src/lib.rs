//! 驱动层模块
//!
//! 本模块负责与树莓派检测服务器之间的全部网络 IO，包括：
//! - HTTP 传输抽象（[`HelmetTransport`]，默认实现基于 `ureq`）
//! - 带重试和地址围栏（fencing）的健康检查握手（[`HealthClient`]）
//! - 周期性检测轮询（[`DetectionPoller`]）
//! - MJPEG 视频流泵（[`StreamPump`]），带限速和自动重连
//! - 事件输出（[`SessionSink`] / [`SinkManager`] / [`ChannelSink`]）
//! - 原子计数器指标（[`SessionMetrics`]）
//!
//! # 使用场景
//!
//! 本层只提供"能被取消的阻塞工作单元"，线程编排和去抖/报警状态机在
//! `helmet-client` 中实现。大多数用户应该直接使用 `helmet-sdk`。

pub mod channel;
pub mod clock;
pub mod connect;
mod error;
pub mod metrics;
pub mod poller;
pub mod sink;
pub mod state;
pub mod stream;
pub mod thread;
pub mod transport;

// 测试用内存传输（单元测试和 `mock` feature 可用）
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::{ChannelSink, SessionEvent};
pub use clock::{CancelToken, Clock, ManualClock, SystemClock, wall_millis};
pub use connect::{ConnectOutcome, ConnectionResult, HealthClient, RetryPolicy};
pub use error::{DriverError, ErrorKind};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use poller::{DetectionPoller, DetectionSample, PollerConfig};
pub use sink::{SessionSink, SinkManager};
pub use state::{AtomicConnectionState, ConnectionState};
pub use stream::{DecodedFrame, FrameCodec, JpegCodec, StreamConfig, StreamExit, StreamPump};
pub use thread::{JoinTimeout, spawn_named};
pub use transport::{HelmetTransport, TransportConfig, UreqTransport};
