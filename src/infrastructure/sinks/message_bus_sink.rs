//! Redis pub/sub stand-in for the original Kafka producer: each event is
//! JSON-serialized and `PUBLISH`ed on its topic channel (`Event::topic`).

use super::EventSink;
use crate::domain::event::Event;
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;

pub struct MessageBusSink {
    conn: ConnectionManager,
    metrics: Arc<Metrics>,
}

impl MessageBusSink {
    pub async fn connect(redis_url: &str, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, metrics })
    }
}

#[async_trait]
impl EventSink for MessageBusSink {
    fn name(&self) -> &'static str {
        "message_bus"
    }

    async fn publish(&self, event: &Event) -> anyhow::Result<()> {
        let topic = event.topic();
        let payload = serde_json::to_string(event)?;

        let mut conn = self.conn.clone();
        let result: redis::RedisResult<i64> = conn.publish(topic, payload).await;

        match result {
            Ok(_subscriber_count) => {
                self.metrics.inc_message_bus_sent(topic);
                Ok(())
            }
            Err(err) => {
                self.metrics.inc_message_bus_error(topic);
                Err(err.into())
            }
        }
    }
}
