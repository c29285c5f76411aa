use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError>;
}

/// Publishes to Redis pub/sub channels, one channel per topic.
#[derive(Clone)]
pub struct RedisBroker {
    connection: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection.publish(topic, payload).await?;
        debug!(topic, receivers, "Published broker message");
        Ok(())
    }
}
