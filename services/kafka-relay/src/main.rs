//! kafka-relay - 订阅 Kafka topic，转发到 `publishTopic` 或记录日志

mod relay;

use std::sync::Arc;

use pubsub_adapter_kafka::{KafkaPubSub, check_kafka_health_async, metrics};
use pubsub_bootstrap::{init_runtime, shutdown_token};
use pubsub_config::RelayConfig;
use pubsub_ports::{PubSub, SubscribeRequest};
use pubsub_telemetry::HealthStatus;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 加载配置
    let config = RelayConfig::load("config")?;
    init_runtime(&config);
    metrics::describe_metrics();

    let mut pubsub = KafkaPubSub::new();
    pubsub.init(config.component.metadata()).await?;

    let (kafka_config, topics, target) = match pubsub.metadata() {
        Some(metadata) => (
            metadata.to_kafka_config()?,
            metadata.topics.clone(),
            metadata.publish_topic.clone(),
        ),
        None => anyhow::bail!("Kafka pubsub was not initialized"),
    };

    // 启动前检查一次连通性，失败不阻止启动
    let mut status = HealthStatus::new();
    match check_kafka_health_async(kafka_config, topics).await {
        Ok(result) => {
            let message = match (&result.error, result.missing_topics.is_empty()) {
                (Some(e), _) => Some(e.clone()),
                (None, false) => Some(format!("missing topics: {:?}", result.missing_topics)),
                (None, true) => None,
            };
            status.add_check("kafka", result.healthy, message);
        }
        Err(e) => status.add_check("kafka", false, Some(e.to_string())),
    }
    if status.healthy {
        info!("Kafka health check passed");
    } else {
        warn!(failing = ?status.failing().collect::<Vec<_>>(), checks = ?status.checks, "Kafka health check failed");
    }

    let pubsub = Arc::new(pubsub);
    let handler = relay::relay_handler(pubsub.clone(), target.clone());

    info!(
        component = %config.component.name,
        target = ?target,
        "Starting relay"
    );

    pubsub
        .subscribe(SubscribeRequest::new(), handler, shutdown_token())
        .await?;

    info!("Relay stopped");
    Ok(())
}
