//! Prelude - 常用类型的便捷导入
//!
//! 大多数用户应该使用这个模块来导入常用类型：
//!
//! ```rust
//! use helmet_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use crate::client::{
    AlarmActuator, AlarmPhase, FileEndpointStore, HelmetSession, SessionBuilder, SessionConfig,
};

// 驱动层（事件输出）
pub use crate::driver::{
    ChannelSink, ConnectionState, DecodedFrame, DetectionSample, MetricsSnapshot, SessionEvent,
    SessionSink,
};

// 协议层
pub use crate::protocol::{DetectionReport, DetectionRoute, ServerEndpoint};

// 工具层
pub use crate::tools::{AlertTone, EventLog, HelmetConfig, HelmetStatus, JsonlEventLog};

// 错误类型
pub use crate::client::SessionError;
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::tools::ConfigError;
