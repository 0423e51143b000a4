//! 内存版客户端，用于单元测试
//!
//! [`MemoryConsumerGroup`] 按分区保存记录日志和已提交的偏移量，
//! 每次会话从已提交位置开始投递，模拟重平衡后的重投行为。

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pubsub_errors::{AppError, AppResult};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{ConsumerConfig, ProducerConfig};
use crate::connector::KafkaConnector;
use crate::group::{
    ConsumerGroup, ConsumerRecord, GroupHandler, GroupSession, PartitionClaim, ReadyGate,
};
use crate::producer::MessageProducer;

type PartitionKey = (String, i32);

pub struct MemoryConnector {
    producer: Arc<dyn MessageProducer>,
    group: Arc<MemoryConsumerGroup>,
}

impl MemoryConnector {
    pub fn new(producer: Arc<dyn MessageProducer>, group: Arc<MemoryConsumerGroup>) -> Self {
        Self { producer, group }
    }
}

impl KafkaConnector for MemoryConnector {
    fn producer(&self, _config: &ProducerConfig) -> AppResult<Arc<dyn MessageProducer>> {
        Ok(self.producer.clone())
    }

    fn consumer_group(&self, _config: &ConsumerConfig) -> AppResult<Arc<dyn ConsumerGroup>> {
        Ok(self.group.clone())
    }
}

struct CommitLog {
    committed: Arc<Mutex<BTreeMap<PartitionKey, i64>>>,
}

impl GroupSession for CommitLog {
    fn mark_record(&self, record: &ConsumerRecord) {
        self.committed
            .lock()
            .unwrap()
            .insert((record.topic.clone(), record.partition), record.offset + 1);
    }
}

#[derive(Default)]
pub struct MemoryConsumerGroup {
    logs: BTreeMap<PartitionKey, Vec<Vec<u8>>>,
    committed: Arc<Mutex<BTreeMap<PartitionKey, i64>>>,
    scripted_errors: Mutex<VecDeque<AppError>>,
    close_error: Mutex<Option<AppError>>,
    hold_open: bool,
    sessions: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
    setup_seen: ReadyGate,
}

impl MemoryConsumerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, topic: &str, partition: i32, payloads: Vec<Vec<u8>>) -> Self {
        self.logs.insert((topic.to_string(), partition), payloads);
        self
    }

    /// 下一次 `consume` 在加入组之前直接失败
    pub fn fail_next_consume(self, error: AppError) -> Self {
        self.scripted_errors.lock().unwrap().push_back(error);
        self
    }

    pub fn fail_close_with(self, error: AppError) -> Self {
        *self.close_error.lock().unwrap() = Some(error);
        self
    }

    /// 日志投递完后保持会话直到取消，模拟没有新消息的稳定分配
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub async fn wait_for_setup(&self) {
        self.setup_seen.wait().await;
    }

    pub fn committed(&self, topic: &str, partition: i32) -> i64 {
        self.committed
            .lock()
            .unwrap()
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsumerGroup for MemoryConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        assert!(!self.closed.load(Ordering::SeqCst), "consume after close");
        if let Some(error) = self.scripted_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let session: Arc<dyn GroupSession> = Arc::new(CommitLog {
            committed: self.committed.clone(),
        });
        self.sessions.fetch_add(1, Ordering::SeqCst);
        handler.setup(session.clone()).await?;
        self.setup_seen.release();

        let mut senders = Vec::new();
        let mut claims = JoinSet::new();
        for ((topic, partition), payloads) in &self.logs {
            if !topics.contains(topic) {
                continue;
            }
            let from = self.committed(topic, *partition);
            let (tx, rx) = mpsc::channel(payloads.len().max(1));
            for (offset, payload) in payloads.iter().enumerate().skip(from as usize) {
                let record = ConsumerRecord {
                    topic: topic.clone(),
                    partition: *partition,
                    offset: offset as i64,
                    payload: payload.clone(),
                };
                tx.try_send(record).unwrap();
            }
            let claim = PartitionClaim::new(topic.clone(), *partition, rx);
            let handler = handler.clone();
            let session = session.clone();
            claims.spawn(async move { handler.consume_claim(session, claim).await });
            senders.push(tx);
        }
        if !self.hold_open {
            senders.clear();
        }

        let mut outcome = loop {
            tokio::select! {
                _ = cancel.cancelled(), if self.hold_open => break Ok(()),
                Some(joined) = claims.join_next() => {
                    if let Err(e) = joined.unwrap() {
                        break Err(e);
                    }
                }
                else => break Ok(()),
            }
        };

        senders.clear();
        while let Some(joined) = claims.join_next().await {
            if let Err(e) = joined.unwrap() {
                outcome = outcome.and(Err(e));
            }
        }
        handler.cleanup(session).await?;
        outcome
    }

    async fn close(&self) -> AppResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        match self.close_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::CallbackHandler;
    use pubsub_ports::{NewMessage, handler_fn};

    #[tokio::test]
    async fn test_replays_from_committed_offset() {
        let group = MemoryConsumerGroup::new().with_records(
            "orders",
            0,
            vec![b"a".to_vec(), b"b".to_vec()],
        );
        let topics = vec!["orders".to_string()];
        let cancel = CancellationToken::new();

        let handler = Arc::new(CallbackHandler::new(handler_fn(|msg: NewMessage| async move {
            if msg.data == b"b" {
                Err(AppError::validation("nope"))
            } else {
                Ok(())
            }
        })));

        assert!(group.consume(&topics, handler.clone(), &cancel).await.is_err());
        assert_eq!(group.committed("orders", 0), 1);

        // 第二次会话仍从 b 开始
        assert!(group.consume(&topics, handler, &cancel).await.is_err());
        assert_eq!(group.committed("orders", 0), 1);
        assert_eq!(group.session_count(), 2);
    }
}
