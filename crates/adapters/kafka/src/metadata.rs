//! 组件元数据解析
//!
//! 将扁平的字符串属性解析为 Kafka 连接参数。解析本身从不失败，
//! 缺失字段在真正创建 producer / consumer 时才校验。

use pubsub_errors::{AppError, AppResult};
use pubsub_ports::Metadata;

use crate::config::{AutoOffsetReset, ConsumerConfig, KafkaConfig, ProducerConfig, SaslConfig};

pub const BROKERS_KEY: &str = "brokers";
pub const TOPICS_KEY: &str = "topics";
pub const CONSUMER_GROUP_KEY: &str = "consumerGroup";
pub const PUBLISH_TOPIC_KEY: &str = "publishTopic";
pub const CLIENT_ID_KEY: &str = "clientID";
pub const AUTH_REQUIRED_KEY: &str = "authRequired";
pub const SASL_USERNAME_KEY: &str = "saslUsername";
pub const SASL_PASSWORD_KEY: &str = "saslPassword";
pub const INITIAL_OFFSET_KEY: &str = "initialOffset";

/// 解析后的连接参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KafkaMetadata {
    pub brokers: Vec<String>,
    pub topics: Vec<String>,
    pub consumer_group: String,
    /// 仅透传，发布时以请求中的 topic 为准
    pub publish_topic: Option<String>,
    pub client_id: Option<String>,
    pub auth_required: bool,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// `oldest` / `newest`，未配置时为 `oldest`
    pub initial_offset: Option<String>,
}

/// 按逗号切分，空串得到空列表
fn split_list(value: Option<&str>) -> Vec<String> {
    match value {
        Some(v) if !v.is_empty() => v.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

impl KafkaMetadata {
    /// 从组件元数据解析，未识别的键被忽略
    pub fn from_properties(metadata: &Metadata) -> Self {
        Self {
            brokers: split_list(metadata.get(BROKERS_KEY)),
            topics: split_list(metadata.get(TOPICS_KEY)),
            consumer_group: metadata
                .get(CONSUMER_GROUP_KEY)
                .unwrap_or_default()
                .to_string(),
            publish_topic: non_empty(metadata.get(PUBLISH_TOPIC_KEY)),
            client_id: non_empty(metadata.get(CLIENT_ID_KEY)),
            auth_required: metadata
                .get(AUTH_REQUIRED_KEY)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            sasl_username: non_empty(metadata.get(SASL_USERNAME_KEY)),
            sasl_password: non_empty(metadata.get(SASL_PASSWORD_KEY)),
            initial_offset: non_empty(metadata.get(INITIAL_OFFSET_KEY)),
        }
    }

    /// 创建 producer 前的校验
    pub fn validate_for_publish(&self) -> AppResult<()> {
        if self.brokers.is_empty() {
            return Err(AppError::configuration("kafka: brokers is required"));
        }
        self.sasl()?;
        Ok(())
    }

    /// 创建 consumer group 前的校验
    pub fn validate_for_subscribe(&self) -> AppResult<()> {
        self.validate_for_publish()?;
        if self.topics.is_empty() {
            return Err(AppError::configuration(
                "kafka: topics is required to subscribe",
            ));
        }
        if self.consumer_group.is_empty() {
            return Err(AppError::configuration(
                "kafka: consumerGroup is required to subscribe",
            ));
        }
        self.auto_offset_reset()?;
        Ok(())
    }

    fn sasl(&self) -> AppResult<Option<SaslConfig>> {
        if !self.auth_required {
            return Ok(None);
        }
        match (&self.sasl_username, &self.sasl_password) {
            (Some(username), Some(password)) => Ok(Some(SaslConfig::plain(username, password))),
            _ => Err(AppError::configuration(
                "kafka: saslUsername and saslPassword are required when authRequired is true",
            )),
        }
    }

    fn auto_offset_reset(&self) -> AppResult<AutoOffsetReset> {
        match self.initial_offset.as_deref() {
            None | Some("oldest") => Ok(AutoOffsetReset::Earliest),
            Some("newest") => Ok(AutoOffsetReset::Latest),
            Some(other) => Err(AppError::configuration(format!(
                "kafka: invalid initialOffset {:?}, expected oldest or newest",
                other
            ))),
        }
    }

    /// 连接基础配置
    pub fn to_kafka_config(&self) -> AppResult<KafkaConfig> {
        let mut config = KafkaConfig::new(self.brokers.join(","));
        if let Some(client_id) = &self.client_id {
            config = config.with_client_id(client_id);
        }
        if let Some(sasl) = self.sasl()? {
            config = config.with_sasl(sasl);
        }
        Ok(config)
    }

    /// 发布路径的 producer 配置
    pub fn to_producer_config(&self) -> AppResult<ProducerConfig> {
        self.validate_for_publish()?;
        Ok(ProducerConfig::new(self.to_kafka_config()?))
    }

    /// 订阅路径的 consumer 配置，`topics` 为空时使用已配置的 topics
    pub fn to_consumer_config(&self, topics: &[String]) -> AppResult<ConsumerConfig> {
        self.validate_for_subscribe()?;
        let topics = if topics.is_empty() {
            self.topics.clone()
        } else {
            topics.to_vec()
        };
        Ok(
            ConsumerConfig::new(self.to_kafka_config()?, &self.consumer_group)
                .with_topics(topics)
                .with_auto_offset_reset(self.auto_offset_reset()?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityProtocol;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_parse_metadata() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("consumerGroup", "a"),
            ("brokers", "a"),
            ("topics", "a"),
        ]));

        assert_eq!(meta.brokers[0], "a");
        assert_eq!(meta.consumer_group, "a");
        assert_eq!(meta.topics[0], "a");
    }

    #[test]
    fn test_single_value_is_not_padded() {
        let meta = KafkaMetadata::from_properties(&metadata(&[("brokers", "a"), ("topics", "a")]));
        assert_eq!(meta.brokers, vec!["a"]);
        assert_eq!(meta.topics, vec!["a"]);
    }

    #[test]
    fn test_lists_preserve_order() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "k3:9092,k1:9092,k2:9092"),
            ("topics", "payments,orders"),
        ]));
        assert_eq!(meta.brokers, vec!["k3:9092", "k1:9092", "k2:9092"]);
        assert_eq!(meta.topics, vec!["payments", "orders"]);
    }

    #[test]
    fn test_missing_keys_produce_empty_values() {
        let meta = KafkaMetadata::from_properties(&Metadata::default());
        assert!(meta.brokers.is_empty());
        assert!(meta.topics.is_empty());
        assert!(meta.consumer_group.is_empty());
        assert!(meta.publish_topic.is_none());

        let meta = KafkaMetadata::from_properties(&metadata(&[("brokers", ""), ("topics", "")]));
        assert!(meta.brokers.is_empty());
        assert!(meta.topics.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let props = metadata(&[
            ("brokers", "a:9092,b:9092"),
            ("topics", "orders"),
            ("consumerGroup", "g"),
            ("publishTopic", "out"),
            ("unknown", "ignored"),
        ]);
        assert_eq!(
            KafkaMetadata::from_properties(&props),
            KafkaMetadata::from_properties(&props)
        );
        assert_eq!(
            KafkaMetadata::from_properties(&props).publish_topic.as_deref(),
            Some("out")
        );
    }

    #[test]
    fn test_validate_for_publish_requires_brokers() {
        let meta = KafkaMetadata::from_properties(&metadata(&[("topics", "orders")]));
        assert!(matches!(
            meta.validate_for_publish(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_for_subscribe() {
        let meta = KafkaMetadata::from_properties(&metadata(&[("brokers", "a:9092")]));
        assert!(meta.validate_for_publish().is_ok());
        assert!(matches!(
            meta.validate_for_subscribe(),
            Err(AppError::Configuration(_))
        ));

        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "a:9092"),
            ("topics", "orders"),
        ]));
        let err = meta.validate_for_subscribe().unwrap_err();
        assert!(err.to_string().contains("consumerGroup"));
    }

    #[test]
    fn test_auth_requires_credentials() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "a:9092"),
            ("authRequired", "true"),
            ("saslUsername", "relay"),
        ]));
        assert!(matches!(
            meta.validate_for_publish(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_producer_config_from_metadata() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "a:9092,b:9092"),
            ("clientID", "relay-1"),
            ("authRequired", "TRUE"),
            ("saslUsername", "relay"),
            ("saslPassword", "secret"),
        ]));

        let config = meta.to_producer_config().unwrap();
        assert_eq!(config.base.brokers, "a:9092,b:9092");
        assert_eq!(config.base.client_id.as_deref(), Some("relay-1"));
        assert_eq!(config.base.security_protocol, SecurityProtocol::SaslPlaintext);
        assert_eq!(config.retries, 5);
    }

    #[test]
    fn test_consumer_config_topics_override() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "a:9092"),
            ("topics", "orders,payments"),
            ("consumerGroup", "g"),
            ("initialOffset", "newest"),
        ]));

        let config = meta.to_consumer_config(&[]).unwrap();
        assert_eq!(config.topics, vec!["orders", "payments"]);
        assert_eq!(config.auto_offset_reset, AutoOffsetReset::Latest);

        let config = meta.to_consumer_config(&["refunds".to_string()]).unwrap();
        assert_eq!(config.topics, vec!["refunds"]);
    }

    #[test]
    fn test_invalid_initial_offset() {
        let meta = KafkaMetadata::from_properties(&metadata(&[
            ("brokers", "a:9092"),
            ("topics", "orders"),
            ("consumerGroup", "g"),
            ("initialOffset", "middle"),
        ]));
        assert!(matches!(
            meta.to_consumer_config(&[]),
            Err(AppError::Configuration(_))
        ));
    }
}
