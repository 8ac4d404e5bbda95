use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A reconciled, speaker-attributed transcript segment.
///
/// Identity is (`session_uid`, `relative_start_ms`): re-delivery of the same
/// interval updates the row instead of inserting a duplicate, enforced by a
/// unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    pub session_uid: String,
    /// Offset from the session's audio start, not wall clock.
    pub relative_start_ms: i64,
    pub relative_end_ms: i64,
    pub text: String,
    pub language: Option<String>,
    pub speaker_name: Option<String>,
    #[serde(default)]
    pub speaker_status: SpeakerStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerStatus {
    /// Not yet correlated (staging only; never persisted in this state).
    #[default]
    Pending,
    /// Exactly one speaker interval intersected the segment.
    Mapped,
    /// No speaker interval intersected the segment.
    Unknown,
    /// Several speaker intervals intersected the segment.
    Multiple,
    /// Correlation failed; the segment is persisted without attribution.
    Error,
}

impl TranscriptSegment {
    pub const COLLECTION: &'static str = "transcripts";
}
