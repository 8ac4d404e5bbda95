use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meetscribe_db::models::{SessionStatus, TranscriptSegment};

use crate::dao::{MeetingDao, SessionDao, TranscriptDao};

use super::{DurableSink, SessionWindow, SinkError};

pub struct MongoSink {
    transcripts: TranscriptDao,
    sessions: SessionDao,
    meetings: MeetingDao,
}

impl MongoSink {
    pub fn new(transcripts: TranscriptDao, sessions: SessionDao, meetings: MeetingDao) -> Self {
        Self {
            transcripts,
            sessions,
            meetings,
        }
    }
}

#[async_trait]
impl DurableSink for MongoSink {
    async fn commit(&self, records: &[TranscriptSegment]) -> Result<usize, SinkError> {
        Ok(self.transcripts.upsert_batch(records).await?)
    }

    async fn session_window(&self, session_uid: &str) -> Result<Option<SessionWindow>, SinkError> {
        let Some(session) = self.sessions.by_uid(session_uid).await? else {
            return Ok(None);
        };
        Ok(Some(SessionWindow {
            meeting_id: session.meeting_id,
            started_at: session.started_at.to_chrono(),
            ended_at: session.ended_at.map(|d| d.to_chrono()),
            closed: session.status == SessionStatus::Closed,
        }))
    }

    async fn close_idle_session(
        &self,
        session_uid: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, SinkError> {
        let ended_at = bson::DateTime::from_chrono(ended_at);
        let closed = self.sessions.close(session_uid, ended_at).await?;
        if closed {
            if let Some(session) = self.sessions.by_uid(session_uid).await? {
                self.meetings
                    .mark_completed(session.meeting_id, ended_at)
                    .await?;
            }
        }
        Ok(closed)
    }
}
