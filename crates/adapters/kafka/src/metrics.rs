//! Kafka 适配器指标
//!
//! 未安装 recorder 时全部为空操作

use ::metrics::{counter, describe_counter};

pub const MESSAGES_PUBLISHED: &str = "pubsub_kafka_messages_published_total";
pub const PUBLISH_FAILURES: &str = "pubsub_kafka_publish_failures_total";
pub const MESSAGES_CONSUMED: &str = "pubsub_kafka_messages_consumed_total";
pub const CONSUME_RESTARTS: &str = "pubsub_kafka_consume_restarts_total";

/// 注册指标描述，宿主安装 recorder 后调用一次
pub fn describe_metrics() {
    describe_counter!(MESSAGES_PUBLISHED, "Messages acknowledged by the brokers");
    describe_counter!(PUBLISH_FAILURES, "Publishes that exhausted the retry budget");
    describe_counter!(
        MESSAGES_CONSUMED,
        "Messages passed to the subscriber callback, by result"
    );
    describe_counter!(CONSUME_RESTARTS, "Consumer group session restarts after an error");
}

pub(crate) fn record_published(topic: &str) {
    counter!(MESSAGES_PUBLISHED, "topic" => topic.to_string()).increment(1);
}

pub(crate) fn record_publish_failure(topic: &str) {
    counter!(PUBLISH_FAILURES, "topic" => topic.to_string()).increment(1);
}

pub(crate) fn record_consumed(result: &'static str) {
    counter!(MESSAGES_CONSUMED, "result" => result).increment(1);
}

pub(crate) fn record_consume_restart() {
    counter!(CONSUME_RESTARTS).increment(1);
}
