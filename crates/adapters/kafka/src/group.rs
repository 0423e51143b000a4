//! 消费者组会话模型
//!
//! 一次会话对应一次稳定的分区分配：
//! `setup` → 每个分区一个 `consume_claim` → `cleanup`。
//! 由 [`ConsumerGroup`] 的实现驱动，[`GroupHandler`] 负责处理记录。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pubsub_errors::AppResult;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

/// 分区中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// 分区认领：本次会话内某个分区的记录序列
///
/// 会话结束或分区被回收时序列结束
#[derive(Debug)]
pub struct PartitionClaim {
    topic: String,
    partition: i32,
    records: mpsc::Receiver<ConsumerRecord>,
}

impl PartitionClaim {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        records: mpsc::Receiver<ConsumerRecord>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            records,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// 下一条记录，序列结束时返回 None
    pub async fn next(&mut self) -> Option<ConsumerRecord> {
        self.records.recv().await
    }
}

/// 会话内的偏移量标记
pub trait GroupSession: Send + Sync {
    /// 标记记录已处理，提交其下一个偏移量
    fn mark_record(&self, record: &ConsumerRecord);
}

/// 消费者组事件处理器
#[async_trait]
pub trait GroupHandler: Send + Sync {
    /// 分区分配生效后调用
    async fn setup(&self, session: Arc<dyn GroupSession>) -> AppResult<()>;

    /// 每个分配到的分区调用一次；返回即表示该分区在本次会话中不再消费
    async fn consume_claim(
        &self,
        session: Arc<dyn GroupSession>,
        claim: PartitionClaim,
    ) -> AppResult<()>;

    /// 会话结束时调用
    async fn cleanup(&self, session: Arc<dyn GroupSession>) -> AppResult<()>;
}

/// 消费者组客户端能力
#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// 加入消费者组并驱动一次会话
    ///
    /// 在重平衡、出错、任一分区认领返回或 `cancel` 被触发时返回，
    /// 调用方需要循环调用以保持组成员身份。
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
        cancel: &CancellationToken,
    ) -> AppResult<()>;

    /// 关闭客户端，离开消费者组
    async fn close(&self) -> AppResult<()>;
}

#[derive(Debug, Default)]
struct GateState {
    released: AtomicBool,
    notify: Notify,
}

/// 一次性就绪闸门
///
/// 只有第一次 `release` 生效；闸门不可复位，需要时替换为新实例。
#[derive(Debug, Clone, Default)]
pub struct ReadyGate {
    state: Arc<GateState>,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开闸门，仅首次调用返回 true
    pub fn release(&self) -> bool {
        if self.state.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.notify.notify_waiters();
        true
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// 等待闸门打开
    pub async fn wait(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        // 先注册再检查，避免错过 release
        notified.as_mut().enable();
        if self.is_released() {
            return;
        }
        notified.await;
    }
}
