//! Kafka 客户端配置模块
//!
//! 将类型化配置渲染为 librdkafka 的键值配置项

use std::time::Duration;

use secrecy::{ExposeSecret, Secret};

/// Kafka 安全协议
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityProtocol {
    /// 明文（默认）
    #[default]
    Plaintext,
    /// SASL 明文
    SaslPlaintext,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
        }
    }
}

/// SASL 认证配置（PLAIN）
#[derive(Debug, Clone)]
pub struct SaslConfig {
    pub username: String,
    /// 密码，Debug 输出时脱敏
    pub password: Secret<String>,
}

impl SaslConfig {
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// Kafka 基础配置
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Broker 地址列表，逗号分隔
    pub brokers: String,
    /// 客户端 ID
    pub client_id: Option<String>,
    /// 安全协议
    pub security_protocol: SecurityProtocol,
    /// SASL 配置
    pub sasl: Option<SaslConfig>,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: None,
            security_protocol: SecurityProtocol::default(),
            sasl: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// 启用 SASL/PLAIN，安全协议切换为 `sasl_plaintext`
    pub fn with_sasl(mut self, sasl: SaslConfig) -> Self {
        self.sasl = Some(sasl);
        self.security_protocol = SecurityProtocol::SaslPlaintext;
        self
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("bootstrap.servers".to_string(), self.brokers.clone()),
            (
                "security.protocol".to_string(),
                self.security_protocol.as_str().to_string(),
            ),
        ];

        if let Some(client_id) = &self.client_id {
            entries.push(("client.id".to_string(), client_id.clone()));
        }

        if let Some(sasl) = &self.sasl {
            entries.push(("sasl.mechanism".to_string(), "PLAIN".to_string()));
            entries.push(("sasl.username".to_string(), sasl.username.clone()));
            entries.push((
                "sasl.password".to_string(),
                sasl.password.expose_secret().clone(),
            ));
        }

        entries
    }
}

/// Producer 配置
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// 基础配置
    pub base: KafkaConfig,
    /// 单条消息的重试次数（由发布路径驱动，librdkafka 内部不再重试）
    pub retries: u32,
    /// 单次发送等待投递结果的超时
    pub request_timeout: Duration,
}

impl ProducerConfig {
    pub fn new(base: KafkaConfig) -> Self {
        Self {
            base,
            retries: 5,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        // 等待所有同步副本确认
        entries.push(("acks".to_string(), "all".to_string()));
        // 每次调用只做一次网络往返，重试预算在 publish 中消耗
        entries.push(("retries".to_string(), "0".to_string()));
        // 不做跨调用的本地攒批
        entries.push(("linger.ms".to_string(), "0".to_string()));
        entries.push((
            "message.timeout.ms".to_string(),
            self.request_timeout.as_millis().to_string(),
        ));

        entries
    }
}

/// 自动偏移重置策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoOffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl AutoOffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoOffsetReset::Earliest => "earliest",
            AutoOffsetReset::Latest => "latest",
        }
    }
}

/// Consumer 配置
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// 基础配置
    pub base: KafkaConfig,
    /// 消费者组 ID
    pub group_id: String,
    /// 订阅的 topics
    pub topics: Vec<String>,
    /// 自动偏移重置策略
    pub auto_offset_reset: AutoOffsetReset,
    /// 会话超时
    pub session_timeout: Duration,
    /// 心跳间隔
    pub heartbeat_interval: Duration,
    /// 每个分区认领的缓冲记录数
    pub claim_buffer: usize,
}

impl ConsumerConfig {
    pub fn new(base: KafkaConfig, group_id: impl Into<String>) -> Self {
        Self {
            base,
            group_id: group_id.into(),
            topics: Vec::new(),
            auto_offset_reset: AutoOffsetReset::default(),
            session_timeout: Duration::from_secs(45),
            heartbeat_interval: Duration::from_secs(3),
            claim_buffer: 256,
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    pub fn with_auto_offset_reset(mut self, reset: AutoOffsetReset) -> Self {
        self.auto_offset_reset = reset;
        self
    }

    /// 转换为 rdkafka ClientConfig 的配置项
    ///
    /// 始终关闭自动提交：偏移量只在回调成功后提交
    pub fn to_client_config_entries(&self) -> Vec<(String, String)> {
        let mut entries = self.base.to_client_config_entries();

        entries.push(("group.id".to_string(), self.group_id.clone()));
        entries.push(("enable.auto.commit".to_string(), "false".to_string()));
        entries.push((
            "auto.offset.reset".to_string(),
            self.auto_offset_reset.as_str().to_string(),
        ));
        entries.push((
            "session.timeout.ms".to_string(),
            self.session_timeout.as_millis().to_string(),
        ));
        entries.push((
            "heartbeat.interval.ms".to_string(),
            self.heartbeat_interval.as_millis().to_string(),
        ));

        entries
    }
}
