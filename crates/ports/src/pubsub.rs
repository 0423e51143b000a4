//! Pub/Sub 抽象
//!
//! 消息中间件适配器需要实现的统一接口

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use pubsub_errors::AppResult;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// 组件元数据：扁平的字符串键值属性
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Metadata {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 发布请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub data: Vec<u8>,
}

impl PublishRequest {
    pub fn new(topic: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            data: data.into(),
        }
    }
}

/// 订阅请求
///
/// `topics` 为空时使用组件配置中的 topics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub topics: Vec<String>,
}

impl SubscribeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }
}

/// 投递给回调的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub topic: String,
    pub data: Vec<u8>,
}

/// 消息回调返回的 future
pub type HandlerFuture = Pin<Box<dyn Future<Output = AppResult<()>> + Send>>;

/// 消息回调：返回 Ok 才会确认该消息
pub type MessageHandler = Arc<dyn Fn(NewMessage) -> HandlerFuture + Send + Sync>;

/// 将异步闭包包装为 [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(NewMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// Pub/Sub 组件 trait
#[async_trait]
pub trait PubSub: Send + Sync {
    /// 解析元数据并建立连接
    async fn init(&mut self, metadata: Metadata) -> AppResult<()>;

    /// 发布一条消息，等待 broker 确认
    async fn publish(&self, req: &PublishRequest) -> AppResult<()>;

    /// 订阅并阻塞，直到 `shutdown` 被取消且资源释放完毕
    async fn subscribe(
        &self,
        req: SubscribeRequest,
        handler: MessageHandler,
        shutdown: CancellationToken,
    ) -> AppResult<()>;
}
