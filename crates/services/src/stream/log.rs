use async_trait::async_trait;
use meetscribe_config::StreamSettings;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, aio::ConnectionManager};
use thiserror::Error;
use tracing::{debug, info};

/// One entry of the append-only event log. The payload is the raw envelope
/// JSON; entries with no payload field surface with an empty payload and are
/// classified as malformed downstream.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Consumer-group view of the event log. At-least-once: an entry read but
/// never acknowledged is redelivered via [`EventLog::reclaim_stale`], so all
/// downstream processing must be idempotent.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Blocking group read of up to `max_count` new entries.
    async fn read(&self, max_count: usize, block_ms: u64) -> Result<Vec<LogEntry>, StreamError>;

    async fn ack(&self, ids: &[String]) -> Result<(), StreamError>;

    /// Claims entries pending longer than `min_idle_ms` (abandoned by a
    /// crashed or stalled consumer) for redelivery to this consumer.
    async fn reclaim_stale(&self, min_idle_ms: u64) -> Result<Vec<LogEntry>, StreamError>;
}

pub struct RedisEventLog {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisEventLog {
    /// Creates the log handle and ensures the consumer group exists
    /// (`MKSTREAM`, tolerating `BUSYGROUP` from a previous run).
    pub async fn new(
        conn: ConnectionManager,
        settings: &StreamSettings,
    ) -> Result<Self, StreamError> {
        let mut setup_conn = conn.clone();
        let created: redis::RedisResult<String> = setup_conn
            .xgroup_create_mkstream(&settings.stream_name, &settings.consumer_group, "0")
            .await;
        match created {
            Ok(_) => info!(
                stream = %settings.stream_name,
                group = %settings.consumer_group,
                "Created consumer group"
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => debug!(
                stream = %settings.stream_name,
                group = %settings.consumer_group,
                "Consumer group already exists"
            ),
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            conn,
            stream: settings.stream_name.clone(),
            group: settings.consumer_group.clone(),
            consumer: settings.consumer_name.clone(),
        })
    }
}

fn entries_from(ids: Vec<StreamId>) -> Vec<LogEntry> {
    ids.into_iter()
        .map(|id| {
            let payload = id
                .map
                .get("payload")
                .and_then(|v| redis::from_redis_value::<String>(v).ok())
                .unwrap_or_default();
            LogEntry {
                id: id.id,
                payload,
            }
        })
        .collect()
}

#[async_trait]
impl EventLog for RedisEventLog {
    async fn read(&self, max_count: usize, block_ms: u64) -> Result<Vec<LogEntry>, StreamError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max_count)
            .block(block_ms as usize);

        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &options)
            .await?;

        let mut entries = Vec::new();
        for key in reply.keys {
            entries.extend(entries_from(key.ids));
        }
        Ok(entries)
    }

    async fn ack(&self, ids: &[String]) -> Result<(), StreamError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.stream, &self.group, ids).await?;
        Ok(())
    }

    async fn reclaim_stale(&self, min_idle_ms: u64) -> Result<Vec<LogEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.stream,
                &self.group,
                &self.consumer,
                min_idle_ms as usize,
                "0-0",
                StreamAutoClaimOptions::default(),
            )
            .await?;
        Ok(entries_from(reply.claimed))
    }
}
