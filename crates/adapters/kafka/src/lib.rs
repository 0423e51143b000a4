//! pubsub-adapter-kafka - Kafka Pub/Sub 适配器
//!
//! 将通用的 Pub/Sub 抽象绑定到 Kafka 集群：
//! - 组件元数据解析（brokers、topics、consumerGroup、SASL）
//! - 同步发布（acks=all，有限重试）
//! - 消费者组订阅（回调成功后才提交偏移量，至少一次投递）
//! - 健康检查与指标

mod config;
mod connector;
mod consumer;
mod group;
mod handler;
mod health;
mod metadata;
pub mod metrics;
mod producer;
mod pubsub;

#[cfg(test)]
mod testing;

pub use config::*;
pub use connector::*;
pub use consumer::*;
pub use group::*;
pub use handler::*;
pub use health::*;
pub use metadata::*;
pub use producer::*;
pub use pubsub::*;
