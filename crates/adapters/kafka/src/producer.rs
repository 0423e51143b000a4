//! Kafka Producer
//!
//! 单条同步发布：每次调用发送一条消息并等待 broker 确认

use std::time::Duration;

use async_trait::async_trait;
use pubsub_errors::{AppError, AppResult};
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use crate::config::ProducerConfig;

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Producer 能力：发送一条消息并等待确认
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<Delivery, KafkaError>;
}

/// 基于 rdkafka 的 producer
pub struct KafkaSyncProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaSyncProducer {
    /// 从完整配置创建
    pub fn new(config: &ProducerConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in config.to_client_config_entries() {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| AppError::connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            brokers = %config.base.brokers,
            retries = config.retries,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            timeout: config.request_timeout,
        })
    }
}

#[async_trait]
impl MessageProducer for KafkaSyncProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<Delivery, KafkaError> {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| e)?;

        debug!(topic, partition, offset, "Message acknowledged");

        Ok(Delivery { partition, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KafkaConfig;

    #[tokio::test]
    #[ignore] // 需要 Kafka 实例
    async fn test_send() {
        let config = ProducerConfig::new(KafkaConfig::new("localhost:9092"));
        let producer = KafkaSyncProducer::new(&config).unwrap();

        let delivery = producer.send("test-topic", b"hello").await.unwrap();
        assert!(delivery.offset >= 0);
    }
}
