//! Kafka 健康检查模块
//!
//! 通过拉取集群元数据检查 broker 连通性，以及订阅的 topic 是否存在

use std::time::{Duration, Instant};

use pubsub_errors::{AppError, AppResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use tracing::{debug, error, warn};

use crate::config::KafkaConfig;

/// 拉取集群元数据的超时
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// 健康检查结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthCheckResult {
    /// 是否健康
    pub healthy: bool,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
    /// 错误信息
    pub error: Option<String>,
    /// Broker 数量
    pub broker_count: usize,
    /// Topic 数量
    pub topic_count: usize,
    /// 期望存在但集群中没有的 topic
    pub missing_topics: Vec<String>,
}

impl HealthCheckResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Kafka 健康检查器
pub struct KafkaHealthChecker {
    consumer: BaseConsumer,
}

impl KafkaHealthChecker {
    /// 创建健康检查器
    pub fn new(config: &KafkaConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in config.to_client_config_entries() {
            client_config.set(key, value);
        }

        let consumer: BaseConsumer = client_config
            .create()
            .map_err(|e| AppError::connection(format!("Failed to create health checker: {}", e)))?;

        Ok(Self { consumer })
    }

    /// 执行健康检查，`topics` 为需要存在的 topic
    pub fn check(&self, topics: &[String]) -> HealthCheckResult {
        let start = Instant::now();

        let metadata = match self.consumer.fetch_metadata(None, METADATA_TIMEOUT) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(error = %e, "Kafka health check failed");
                return HealthCheckResult::failed(e.to_string());
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let broker_count = metadata.brokers().len();
        let existing: Vec<&str> = metadata
            .topics()
            .iter()
            .filter(|t| t.error().is_none())
            .map(|t| t.name())
            .collect();
        let missing_topics = missing_topics(topics, &existing);

        if !missing_topics.is_empty() {
            warn!(missing = ?missing_topics, "Subscribed topics not found in cluster");
        }
        debug!(
            latency_ms = latency,
            brokers = broker_count,
            topics = existing.len(),
            "Kafka health check passed"
        );

        HealthCheckResult {
            healthy: broker_count > 0 && missing_topics.is_empty(),
            latency_ms: Some(latency),
            error: None,
            broker_count,
            topic_count: existing.len(),
            missing_topics,
        }
    }
}

fn missing_topics(wanted: &[String], existing: &[&str]) -> Vec<String> {
    wanted
        .iter()
        .filter(|t| !existing.contains(&t.as_str()))
        .cloned()
        .collect()
}

/// 异步健康检查（在后台线程执行）
pub async fn check_kafka_health_async(
    config: KafkaConfig,
    topics: Vec<String>,
) -> AppResult<HealthCheckResult> {
    tokio::task::spawn_blocking(move || {
        let checker = KafkaHealthChecker::new(&config)?;
        Ok(checker.check(&topics))
    })
    .await
    .map_err(|e| AppError::internal(format!("Health check task failed: {}", e)))?
}
