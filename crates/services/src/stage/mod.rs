pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::redis::RedisStageStore;

/// A transcript segment that has not settled yet. Keyed within its session
/// by `relative_start_ms`; re-delivery of the same interval overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedSegment {
    pub session_uid: String,
    pub relative_start_ms: i64,
    pub relative_end_ms: i64,
    pub text: String,
    pub language: Option<String>,
    /// Wall clock of the latest delivery; drives the immutability check.
    pub updated_at: DateTime<Utc>,
}

/// Per-participant speaking activity, on the same relative timeline as the
/// session's segments. Buffered only until correlation; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerEvent {
    pub session_uid: String,
    pub participant_id: Option<String>,
    pub participant_name: String,
    pub kind: SpeakerEventKind,
    pub relative_timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeakerEventKind {
    Start,
    End,
}

/// A session with unreconciled staged data, plus the epoch millis of its
/// last staging write (used for the implicit session-end grace check).
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub session_uid: String,
    pub last_write_ms: i64,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("staged payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The mutable, TTL-bounded staging area between the event log and durable
/// storage. All writes are idempotent overwrites and re-register the session
/// in the active-session index.
#[async_trait]
pub trait StageStore: Send + Sync {
    async fn upsert_segments(
        &self,
        session_uid: &str,
        segments: &[StagedSegment],
    ) -> Result<(), StageError>;

    async fn segments(&self, session_uid: &str) -> Result<Vec<StagedSegment>, StageError>;

    /// Evicts reconciled candidates by their `relative_start_ms` keys.
    async fn remove_segments(&self, session_uid: &str, starts: &[i64]) -> Result<(), StageError>;

    async fn push_speaker_event(&self, event: &SpeakerEvent) -> Result<(), StageError>;

    /// Buffered speaker events for the session, ordered by relative timestamp.
    async fn speaker_events(&self, session_uid: &str) -> Result<Vec<SpeakerEvent>, StageError>;

    async fn active_sessions(&self) -> Result<Vec<ActiveSession>, StageError>;

    /// Drops the session from the active index and clears its speaker buffer.
    async fn deactivate(&self, session_uid: &str) -> Result<(), StageError>;
}
