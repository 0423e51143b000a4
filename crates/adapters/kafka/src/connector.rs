//! 客户端工厂
//!
//! 适配器通过 [`KafkaConnector`] 创建 producer 与消费者组客户端，测试中可替换为内存实现。

use std::sync::Arc;

use pubsub_errors::AppResult;

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::consumer::KafkaConsumerGroup;
use crate::group::ConsumerGroup;
use crate::producer::{KafkaSyncProducer, MessageProducer};

pub trait KafkaConnector: Send + Sync {
    /// 创建同步 producer
    fn producer(&self, config: &ProducerConfig) -> AppResult<Arc<dyn MessageProducer>>;

    /// 创建新的消费者组客户端，每次订阅一个
    fn consumer_group(&self, config: &ConsumerConfig) -> AppResult<Arc<dyn ConsumerGroup>>;
}

/// 基于 rdkafka 的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct RdKafkaConnector;

impl KafkaConnector for RdKafkaConnector {
    fn producer(&self, config: &ProducerConfig) -> AppResult<Arc<dyn MessageProducer>> {
        Ok(Arc::new(KafkaSyncProducer::new(config)?))
    }

    fn consumer_group(&self, config: &ConsumerConfig) -> AppResult<Arc<dyn ConsumerGroup>> {
        Ok(Arc::new(KafkaConsumerGroup::new(config)?))
    }
}
