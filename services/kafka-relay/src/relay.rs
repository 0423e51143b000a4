//! 消息转发

use std::sync::Arc;

use pubsub_ports::{MessageHandler, NewMessage, PubSub, PublishRequest, handler_fn};
use tracing::info;

/// 构造订阅回调：配置了目标 topic 时转发，否则只记录日志
///
/// 转发失败时返回错误，消息不会被确认，稍后重投
pub fn relay_handler(pubsub: Arc<dyn PubSub>, target: Option<String>) -> MessageHandler {
    handler_fn(move |msg: NewMessage| {
        let pubsub = pubsub.clone();
        let target = target.clone();
        async move {
            match target {
                Some(topic) => {
                    pubsub.publish(&PublishRequest::new(topic, msg.data)).await
                }
                None => {
                    info!(topic = %msg.topic, bytes = msg.data.len(), "Message received");
                    Ok(())
                }
            }
        }
    })
}
