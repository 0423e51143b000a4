//! ports - 抽象 trait 层
//!
//! 定义消息中间件的抽象接口

mod pubsub;

pub use pubsub::*;
