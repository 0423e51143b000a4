//! Kafka Consumer Group
//!
//! 基于 rdkafka `StreamConsumer` 驱动 [`GroupHandler`] 会话：
//! 分区分配生效即开始一次会话，分配变化、出错、任一分区认领返回或取消时结束。
//! 会话结束时，已投递但未标记的分区会回退到第一条未标记的偏移量。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pubsub_errors::{AppError, AppResult};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::group::{ConsumerGroup, ConsumerRecord, GroupHandler, GroupSession, PartitionClaim};

/// 检查分区分配变化的间隔
const ASSIGNMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// 回退偏移量的超时
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

type PartitionKey = (String, i32);

/// 客户端回调上下文
pub struct GroupContext;

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        if let Err(e) = result {
            warn!(error = %e, partitions = offsets.count(), "Offset commit failed");
        }
    }
}

#[derive(Debug, Default)]
struct PartitionProgress {
    /// 第一条已投递但未标记的偏移量
    first_unmarked: Option<i64>,
    /// 最后投递的偏移量
    last_delivered: i64,
}

/// 一次会话的偏移量簿记
struct KafkaGroupSession {
    consumer: Arc<StreamConsumer<GroupContext>>,
    progress: Mutex<HashMap<PartitionKey, PartitionProgress>>,
}

impl KafkaGroupSession {
    fn new(consumer: Arc<StreamConsumer<GroupContext>>) -> Self {
        Self {
            consumer,
            progress: Mutex::new(HashMap::new()),
        }
    }

    fn track(&self, record: &ConsumerRecord) {
        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = progress
            .entry((record.topic.clone(), record.partition))
            .or_default();
        entry.first_unmarked.get_or_insert(record.offset);
        entry.last_delivered = record.offset;
    }

    /// 将有未标记记录的分区回退，下次会话重新投递
    fn rewind(&self) {
        let progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        for ((topic, partition), p) in progress.iter() {
            let Some(offset) = p.first_unmarked else {
                continue;
            };
            match self
                .consumer
                .seek(topic, *partition, Offset::Offset(offset), SEEK_TIMEOUT)
            {
                Ok(()) => debug!(topic = %topic, partition, offset, "Partition rewound"),
                // 分区已被回收时由新的持有者从已提交位置继续
                Err(e) => debug!(topic = %topic, partition, offset, error = %e, "Rewind skipped"),
            }
        }
    }
}

impl GroupSession for KafkaGroupSession {
    fn mark_record(&self, record: &ConsumerRecord) {
        {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(p) = progress.get_mut(&(record.topic.clone(), record.partition)) {
                p.first_unmarked = (record.offset < p.last_delivered).then_some(record.offset + 1);
            }
        }

        let mut tpl = TopicPartitionList::new();
        if let Err(e) =
            tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
        {
            error!(topic = %record.topic, partition = record.partition, error = %e, "Invalid commit offset");
            return;
        }
        if let Err(e) = self.consumer.commit(&tpl, CommitMode::Async) {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to commit offset"
            );
        }
    }
}

/// 进行中的会话
struct ActiveSession {
    session: Arc<KafkaGroupSession>,
    assignment: Vec<PartitionKey>,
    senders: HashMap<PartitionKey, mpsc::Sender<ConsumerRecord>>,
    claims: JoinSet<AppResult<()>>,
}

impl ActiveSession {
    async fn dispatch(&mut self, record: ConsumerRecord) -> bool {
        let key = (record.topic.clone(), record.partition);
        self.session.track(&record);
        let Some(tx) = self.senders.get(&key) else {
            return false;
        };
        if tx.send(record).await.is_err() {
            debug!(topic = %key.0, partition = key.1, "Claim finished, record left for redelivery");
        }
        true
    }

    /// 关闭所有认领并等待其处理完缓冲的记录
    async fn finish(mut self) -> (Arc<KafkaGroupSession>, AppResult<()>) {
        self.senders.clear();
        let mut outcome = Ok(());
        while let Some(joined) = self.claims.join_next().await {
            if let Err(e) = claim_outcome(joined) {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        (self.session, outcome)
    }
}

fn claim_outcome(joined: Result<AppResult<()>, JoinError>) -> AppResult<()> {
    joined.map_err(|e| AppError::internal(format!("Claim task failed: {}", e)))?
}

async fn next_finished_claim(
    active: &mut Option<ActiveSession>,
) -> Option<Result<AppResult<()>, JoinError>> {
    match active {
        Some(a) => a.claims.join_next().await,
        None => std::future::pending().await,
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> ConsumerRecord {
    ConsumerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

/// 基于 rdkafka 的消费者组客户端
pub struct KafkaConsumerGroup {
    consumer: Arc<StreamConsumer<GroupContext>>,
    group_id: String,
    claim_buffer: usize,
    subscribed: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl KafkaConsumerGroup {
    /// 从完整配置创建
    pub fn new(config: &ConsumerConfig) -> AppResult<Self> {
        let mut client_config = ClientConfig::new();

        for (key, value) in config.to_client_config_entries() {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer<GroupContext> = client_config
            .create_with_context(GroupContext)
            .map_err(|e| AppError::connection(format!("Failed to create Kafka consumer: {}", e)))?;

        info!(
            group_id = %config.group_id,
            topics = ?config.topics,
            "Kafka consumer created"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            group_id: config.group_id.clone(),
            claim_buffer: config.claim_buffer.max(1),
            subscribed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// 获取消费者组 ID
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn ensure_subscribed(&self, topics: &[String]) -> AppResult<()> {
        let mut subscribed = self.subscribed.lock().unwrap_or_else(PoisonError::into_inner);
        if subscribed.as_slice() == topics {
            return Ok(());
        }

        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&refs)
            .map_err(|e| AppError::connection(format!("Failed to subscribe to topics: {}", e)))?;
        *subscribed = topics.to_vec();
        Ok(())
    }

    fn assignment(&self) -> AppResult<Vec<PartitionKey>> {
        let tpl = self
            .consumer
            .assignment()
            .map_err(|e| AppError::external_service(format!("Failed to read assignment: {}", e)))?;
        let mut partitions: Vec<PartitionKey> = tpl
            .elements()
            .iter()
            .map(|e| (e.topic().to_string(), e.partition()))
            .collect();
        partitions.sort();
        Ok(partitions)
    }

    async fn start_session(
        &self,
        assignment: Vec<PartitionKey>,
        handler: &Arc<dyn GroupHandler>,
    ) -> AppResult<ActiveSession> {
        let session = Arc::new(KafkaGroupSession::new(self.consumer.clone()));
        handler.setup(session.clone()).await?;

        let mut senders = HashMap::new();
        let mut claims = JoinSet::new();
        for (topic, partition) in &assignment {
            let (tx, rx) = mpsc::channel(self.claim_buffer);
            let claim = PartitionClaim::new(topic.clone(), *partition, rx);
            let handler = handler.clone();
            let shared: Arc<dyn GroupSession> = session.clone();
            claims.spawn(async move { handler.consume_claim(shared, claim).await });
            senders.insert((topic.clone(), *partition), tx);
        }

        info!(
            group_id = %self.group_id,
            partitions = assignment.len(),
            "Consumer group session started"
        );

        Ok(ActiveSession {
            session,
            assignment,
            senders,
            claims,
        })
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn consume(
        &self,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::failed_precondition("Kafka consumer group is closed"));
        }
        self.ensure_subscribed(topics)?;

        let mut stream = self.consumer.stream();
        let mut ticker = tokio::time::interval(ASSIGNMENT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut active: Option<ActiveSession> = None;

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ok(()),

                Some(joined) = next_finished_claim(&mut active) => {
                    break claim_outcome(joined);
                }

                _ = ticker.tick() => {
                    let current = match self.assignment() {
                        Ok(current) => current,
                        Err(e) => break Err(e),
                    };
                    match &active {
                        Some(a) if a.assignment != current => {
                            info!(group_id = %self.group_id, "Partition assignment changed, ending session");
                            break Ok(());
                        }
                        None if !current.is_empty() => {
                            match self.start_session(current, &handler).await {
                                Ok(a) => active = Some(a),
                                Err(e) => break Err(e),
                            }
                        }
                        _ => {}
                    }
                }

                message = stream.next() => {
                    let record = match message {
                        Some(Ok(m)) => to_record(&m),
                        Some(Err(e)) => break Err(AppError::external_service(format!("Kafka error: {}", e))),
                        None => break Err(AppError::connection("Kafka consumer stream ended")),
                    };

                    if active.is_none() {
                        let current = match self.assignment() {
                            Ok(current) => current,
                            Err(e) => break Err(e),
                        };
                        match self.start_session(current, &handler).await {
                            Ok(a) => active = Some(a),
                            Err(e) => break Err(e),
                        }
                    }

                    if let Some(a) = active.as_mut() {
                        if !a.dispatch(record).await {
                            info!(group_id = %self.group_id, "Record from a new partition, ending session");
                            break Ok(());
                        }
                    }
                }
            }
        };
        drop(stream);

        let Some(active) = active else {
            return outcome;
        };

        let (session, drained) = active.finish().await;
        session.rewind();
        if let Err(e) = handler.cleanup(session).await {
            warn!(error = %e, "Session cleanup failed");
        }
        debug!(group_id = %self.group_id, "Consumer group session ended");

        outcome.and(drained)
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.consumer.unsubscribe();
        info!(group_id = %self.group_id, "Kafka consumer closed");
        Ok(())
    }
}
