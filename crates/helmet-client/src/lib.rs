//! 客户端接口模块
//!
//! 本模块在驱动层之上实现完整的远程检测会话：
//! - 两级去抖 + 持续时长报警状态机（[`DrowsinessStateMachine`]）
//! - 串行化的报警定时器队列（[`AlarmTimerQueue`]）
//! - 连接编排与代号围栏（[`HelmetSession`]）
//! - 报警执行器与状态记录（[`AlarmActuator`] / [`StatusRecorder`]）
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。如果只需要单次健康检查或检测请求，
//! 可以直接使用 `helmet-driver`。

pub mod actuator;
pub mod builder;
pub mod config;
mod error;
pub mod machine;
pub mod recorder;
pub mod session;
pub mod timer;

// 重新导出常用类型
pub use actuator::{AlarmActuator, LatchedActuator, NullActuator};
pub use builder::SessionBuilder;
pub use config::{EndpointStore, FileEndpointStore, MemoryEndpointStore, SessionConfig};
pub use error::SessionError;
pub use machine::{
    AlarmEvent, AlarmPhase, AlarmSession, DebounceConfig, DebouncedState, DrowsinessStateMachine,
};
pub use recorder::StatusRecorder;
pub use session::HelmetSession;
pub use timer::{AlarmTimerQueue, SampleSender};
