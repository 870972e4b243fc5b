//! Helmet SDK - 智能头盔远程困倦检测 Rust SDK
//!
//! 手机端（或任意主机）通过 HTTP 连接树莓派检测服务器，拉取 MJPEG 视频流、
//! 周期性轮询检测结果，经过两级去抖后在持续困倦时触发报警。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 服务器地址、检测/健康 JSON、MJPEG 切帧
//! - **驱动层** (`driver`): HTTP 传输、握手重试、轮询、视频流泵、事件 sink
//! - **工具层** (`tools`): TOML 配置、报警提示音、状态记录
//! - **客户端层** (`client`): 去抖/报警状态机、会话协调器
//!
//! # 快速开始
//!
//! 大多数用户应该使用高层 API（会话接口）：
//!
//! ```rust,no_run
//! use helmet_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! helmet_sdk::init_logger!();
//!
//! let (sink, events) = ChannelSink::new(256);
//! let session = SessionBuilder::new()
//!     .endpoint("192.168.43.151:5000")
//!     .sink(Arc::new(sink.without_frames()))
//!     .build()?;
//! session.start()?;
//!
//! for event in events.iter() {
//!     if let SessionEvent::AlarmActivated = event {
//!         println!("wake up!");
//!     }
//! }
//! # Ok::<(), SessionError>(())
//! ```
//!
//! 只需要单次健康检查或检测请求的用户可以直接使用驱动层：
//!
//! ```rust,no_run
//! use helmet_sdk::driver::{HelmetTransport, UreqTransport};
//! use helmet_sdk::protocol::ServerEndpoint;
//!
//! let endpoint = ServerEndpoint::parse("192.168.43.151:5000").unwrap();
//! let report = UreqTransport::default().health(&endpoint);
//! ```

/// 协议层（线上格式，无 IO）
pub mod protocol {
    pub use helmet_protocol::*;
}

/// 驱动层（网络 IO 与工作单元）
pub mod driver {
    pub use helmet_driver::*;
}

/// 工具层（配置、提示音、状态记录）
pub mod tools {
    pub use helmet_tools::*;
}

/// 客户端层（状态机与会话）
pub mod client {
    pub use helmet_client::*;
}

// Prelude 模块
pub mod prelude;

// --- 用户以此为界 ---
// 以下是通过 Facade Pattern 提供的公共 API

// 协议层
pub use protocol::{DEFAULT_ENDPOINT, ProtocolError, ServerEndpoint};

// 驱动层错误与事件
pub use driver::{ChannelSink, ConnectionState, DriverError, SessionEvent, SessionSink};

// 工具层
pub use tools::{AlertTone, ConfigError, HelmetConfig};

// 客户端层 - 这是推荐的入口点
pub use client::{AlarmActuator, HelmetSession, SessionBuilder, SessionConfig, SessionError};

#[doc(hidden)]
pub mod __private {
    pub use log;
    pub use tracing_log;
    pub use tracing_subscriber;
}

/// 初始化日志
///
/// 安装 `tracing-subscriber` 的 fmt 输出，过滤规则取自 `RUST_LOG`，
/// 未设置时使用给定的默认级别（缺省 `info`）。同时通过 `tracing-log`
/// 把 `log` crate 的记录转发到 tracing。
///
/// 重复调用是安全的，只有第一次生效。
///
/// ```rust
/// helmet_sdk::init_logger!();
/// helmet_sdk::init_logger!("helmet_client=debug");
/// ```
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger!("info")
    };
    ($default:expr) => {{
        use $crate::__private::tracing_subscriber::EnvFilter;

        let _ = $crate::__private::tracing_log::LogTracer::builder()
            .with_max_level($crate::__private::log::LevelFilter::Trace)
            .init();

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new($default));
        let _ = $crate::__private::tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    }};
}
