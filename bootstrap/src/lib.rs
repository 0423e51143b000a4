//! pubsub-bootstrap - 宿主进程启动骨架
//!
//! 初始化日志与指标，并把进程信号转换为取消令牌

mod runtime;
mod shutdown;

pub use runtime::*;
pub use shutdown::*;
