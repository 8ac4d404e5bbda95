use async_trait::async_trait;
use chrono::Utc;
use meetscribe_config::StageSettings;
use redis::{AsyncCommands, aio::ConnectionManager};

use super::{ActiveSession, SpeakerEvent, StageError, StageStore, StagedSegment};

const ACTIVE_SESSIONS_KEY: &str = "stage:active_sessions";

/// Redis-backed staging: a hash of segments and a zset of speaker events per
/// session, plus a zset of active sessions scored by last-write time.
pub struct RedisStageStore {
    conn: ConnectionManager,
    settings: StageSettings,
}

fn segments_key(session_uid: &str) -> String {
    format!("stage:{session_uid}:segments")
}

fn speakers_key(session_uid: &str) -> String {
    format!("stage:{session_uid}:speakers")
}

impl RedisStageStore {
    pub fn new(conn: ConnectionManager, settings: StageSettings) -> Self {
        Self { conn, settings }
    }
}

#[async_trait]
impl StageStore for RedisStageStore {
    async fn upsert_segments(
        &self,
        session_uid: &str,
        segments: &[StagedSegment],
    ) -> Result<(), StageError> {
        if segments.is_empty() {
            return Ok(());
        }
        let mut entries = Vec::with_capacity(segments.len());
        for segment in segments {
            entries.push((
                segment.relative_start_ms.to_string(),
                serde_json::to_string(segment)?,
            ));
        }

        let key = segments_key(session_uid);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &entries)
            .ignore()
            .expire(&key, self.settings.segment_ttl_secs as i64)
            .ignore()
            .zadd(
                ACTIVE_SESSIONS_KEY,
                session_uid,
                Utc::now().timestamp_millis(),
            )
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn segments(&self, session_uid: &str) -> Result<Vec<StagedSegment>, StageError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, String)> = conn.hgetall(segments_key(session_uid)).await?;
        let mut segments = Vec::with_capacity(raw.len());
        for (_, json) in raw {
            segments.push(serde_json::from_str(&json)?);
        }
        segments.sort_by_key(|s: &StagedSegment| s.relative_start_ms);
        Ok(segments)
    }

    async fn remove_segments(&self, session_uid: &str, starts: &[i64]) -> Result<(), StageError> {
        if starts.is_empty() {
            return Ok(());
        }
        let fields: Vec<String> = starts.iter().map(|s| s.to_string()).collect();
        let mut conn = self.conn.clone();
        let _: i64 = conn.hdel(segments_key(session_uid), fields).await?;
        Ok(())
    }

    async fn push_speaker_event(&self, event: &SpeakerEvent) -> Result<(), StageError> {
        let key = speakers_key(&event.session_uid);
        let member = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(&key, member, event.relative_timestamp_ms)
            .ignore()
            .expire(&key, self.settings.speaker_event_ttl_secs as i64)
            .ignore()
            .zadd(
                ACTIVE_SESSIONS_KEY,
                &event.session_uid,
                Utc::now().timestamp_millis(),
            )
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn speaker_events(&self, session_uid: &str) -> Result<Vec<SpeakerEvent>, StageError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.zrange(speakers_key(session_uid), 0, -1).await?;
        let mut events = Vec::with_capacity(raw.len());
        for json in raw {
            events.push(serde_json::from_str(&json)?);
        }
        Ok(events)
    }

    async fn active_sessions(&self) -> Result<Vec<ActiveSession>, StageError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, i64)> = conn.zrange_withscores(ACTIVE_SESSIONS_KEY, 0, -1).await?;
        Ok(raw
            .into_iter()
            .map(|(session_uid, last_write_ms)| ActiveSession {
                session_uid,
                last_write_ms,
            })
            .collect())
    }

    async fn deactivate(&self, session_uid: &str) -> Result<(), StageError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(ACTIVE_SESSIONS_KEY, session_uid)
            .ignore()
            .del(speakers_key(session_uid))
            .ignore()
            .del(segments_key(session_uid))
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
