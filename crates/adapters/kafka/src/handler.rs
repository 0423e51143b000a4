//! 回调驱动的会话处理器
//!
//! 只有回调成功的记录才会被标记提交。回调失败时该分区停止消费并结束会话，
//! 分区回到最后一次提交的位置，失败的记录在下一次会话中重新投递。

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use pubsub_errors::{AppError, AppResult};
use pubsub_ports::{MessageHandler, NewMessage};
use tracing::{debug, info, warn};

use crate::group::{GroupHandler, GroupSession, PartitionClaim, ReadyGate};
use crate::metrics;

pub struct CallbackHandler {
    callback: MessageHandler,
    ready: Mutex<ReadyGate>,
}

impl CallbackHandler {
    pub fn new(callback: MessageHandler) -> Self {
        Self {
            callback,
            ready: Mutex::new(ReadyGate::new()),
        }
    }

    /// 当前的就绪闸门
    pub fn ready(&self) -> ReadyGate {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 闸门已打开时换上新的闸门，返回是否发生替换
    pub fn reset_ready(&self) -> bool {
        let mut gate = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.is_released() {
            *gate = ReadyGate::new();
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl GroupHandler for CallbackHandler {
    async fn setup(&self, _session: Arc<dyn GroupSession>) -> AppResult<()> {
        if self.ready().release() {
            info!("Kafka consumer group session ready");
        }
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: Arc<dyn GroupSession>,
        mut claim: PartitionClaim,
    ) -> AppResult<()> {
        while let Some(record) = claim.next().await {
            let message = NewMessage {
                topic: claim.topic().to_string(),
                data: record.payload.clone(),
            };

            match (self.callback)(message).await {
                Ok(()) => {
                    session.mark_record(&record);
                    metrics::record_consumed("ok");
                    debug!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        "Message handled"
                    );
                }
                Err(e) => {
                    metrics::record_consumed("error");
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Message handler failed, offset left uncommitted"
                    );
                    return Err(AppError::handler_rejected(format!(
                        "{}/{}@{}: {}",
                        record.topic, record.partition, record.offset, e
                    )));
                }
            }
        }
        Ok(())
    }

    async fn cleanup(&self, _session: Arc<dyn GroupSession>) -> AppResult<()> {
        Ok(())
    }
}
