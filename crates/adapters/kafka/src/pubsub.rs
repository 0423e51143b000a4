//! Kafka Pub/Sub 组件
//!
//! [`KafkaPubSub`] 实现 [`PubSub`]：
//! - `init` 解析元数据并创建共享的 producer
//! - `publish` 单条同步发送，失败时按重试预算重试
//! - `subscribe` 在后台任务中循环驱动消费者组会话，直到取消

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pubsub_common::{RetryConfig, with_retry};
use pubsub_errors::{AppError, AppResult};
use pubsub_ports::{Metadata, MessageHandler, PubSub, PublishRequest, SubscribeRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connector::{KafkaConnector, RdKafkaConnector};
use crate::group::{ConsumerGroup, GroupHandler};
use crate::handler::CallbackHandler;
use crate::metadata::KafkaMetadata;
use crate::metrics;
use crate::producer::MessageProducer;

struct Connected {
    metadata: KafkaMetadata,
    producer: Arc<dyn MessageProducer>,
    publish_retry: RetryConfig,
}

/// Kafka Pub/Sub 组件
pub struct KafkaPubSub {
    connector: Arc<dyn KafkaConnector>,
    state: Option<Connected>,
    publish_delays: (Duration, Duration),
    restart_backoff: RetryConfig,
}

impl Default for KafkaPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl KafkaPubSub {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(RdKafkaConnector))
    }

    pub fn with_connector(connector: Arc<dyn KafkaConnector>) -> Self {
        let defaults = RetryConfig::default();
        Self {
            connector,
            state: None,
            publish_delays: (defaults.initial_delay, defaults.max_delay),
            restart_backoff: defaults,
        }
    }

    /// 设置消费循环出错后的重启退避
    pub fn with_restart_backoff(mut self, backoff: RetryConfig) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// 设置发布重试之间的延迟区间
    pub fn with_publish_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.publish_delays = (initial_delay, max_delay);
        self
    }

    /// 已解析的元数据，`init` 之前为 None
    pub fn metadata(&self) -> Option<&KafkaMetadata> {
        self.state.as_ref().map(|s| &s.metadata)
    }

    fn connected(&self) -> AppResult<&Connected> {
        self.state
            .as_ref()
            .ok_or_else(|| AppError::failed_precondition("kafka pubsub is not initialized"))
    }
}

#[async_trait]
impl PubSub for KafkaPubSub {
    async fn init(&mut self, metadata: Metadata) -> AppResult<()> {
        let metadata = KafkaMetadata::from_properties(&metadata);
        let producer_config = metadata.to_producer_config()?;
        let producer = self.connector.producer(&producer_config)?;

        let (initial_delay, max_delay) = self.publish_delays;
        let publish_retry =
            RetryConfig::with_retries(producer_config.retries).with_delays(initial_delay, max_delay);

        info!(
            brokers = ?metadata.brokers,
            topics = ?metadata.topics,
            consumer_group = %metadata.consumer_group,
            "Kafka pubsub initialized"
        );

        self.state = Some(Connected {
            metadata,
            producer,
            publish_retry,
        });
        Ok(())
    }

    async fn publish(&self, req: &PublishRequest) -> AppResult<()> {
        let connected = self.connected()?;
        let producer = &connected.producer;

        let result = with_retry(&connected.publish_retry, "kafka_publish", || {
            producer.send(&req.topic, &req.data)
        })
        .await;

        match result {
            Ok(delivery) => {
                metrics::record_published(&req.topic);
                debug!(
                    topic = %req.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Message published"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_publish_failure(&req.topic);
                Err(AppError::transport(e))
            }
        }
    }

    async fn subscribe(
        &self,
        req: SubscribeRequest,
        handler: MessageHandler,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        let connected = self.connected()?;
        let consumer_config = connected.metadata.to_consumer_config(&req.topics)?;
        let client = self.connector.consumer_group(&consumer_config)?;

        let callback = Arc::new(CallbackHandler::new(handler));
        let ready = callback.ready();
        let cancel = shutdown.child_token();

        let consume_loop = tokio::spawn(run_consume_loop(
            client.clone(),
            consumer_config.topics.clone(),
            callback,
            cancel.clone(),
            self.restart_backoff.clone(),
        ));

        tokio::select! {
            _ = ready.wait() => info!(
                group_id = %consumer_config.group_id,
                topics = ?consumer_config.topics,
                "Kafka subscription ready"
            ),
            _ = shutdown.cancelled() => {}
        }

        shutdown.cancelled().await;
        info!(group_id = %consumer_config.group_id, "Shutting down Kafka subscription");

        cancel.cancel();
        let joined = consume_loop.await;
        let closed = client.close().await;

        joined.map_err(|e| AppError::internal(format!("Consume loop task failed: {}", e)))?;
        closed
    }
}

/// 循环驱动消费者组会话直到取消
///
/// 每次 `consume` 返回代表一次会话结束（通常是重平衡），需重新加入。
/// 客户端出错时记录日志并按指数退避重启，干净结束的会话会重置退避。
/// 回调拒绝消息不算客户端故障：只等待初始延迟后重新加入，消息随即重投。
pub async fn run_consume_loop(
    client: Arc<dyn ConsumerGroup>,
    topics: Vec<String>,
    handler: Arc<CallbackHandler>,
    cancel: CancellationToken,
    backoff: RetryConfig,
) {
    let mut failures: u32 = 0;

    loop {
        let group_handler: Arc<dyn GroupHandler> = handler.clone();
        let result = client.consume(&topics, group_handler, &cancel).await;

        if cancel.is_cancelled() {
            if let Err(e) = result {
                debug!(error = %e, "Consumer group session ended during shutdown");
            }
            break;
        }

        handler.reset_ready();

        let delay = match result {
            Ok(()) => {
                failures = 0;
                continue;
            }
            Err(AppError::HandlerRejected(reason)) => {
                warn!(reason = %reason, "Message rejected by handler, rejoining for redelivery");
                backoff.initial_delay
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                metrics::record_consume_restart();
                let delay = backoff.delay_for_attempt(failures - 1);
                error!(
                    error = %e,
                    kind = e.kind(),
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Kafka consumer group session failed"
                );
                delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    if failures > 0 {
        warn!(failures, "Consume loop stopped after failed sessions");
    }
    debug!("Consume loop stopped");
}
