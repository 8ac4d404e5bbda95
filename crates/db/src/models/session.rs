use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// One continuous audio-capture connection. A reconnect produces a new
/// session with a fresh `session_uid`; historical sessions stay queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSession {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: ObjectId,
    /// Opaque correlation key, unique per connection attempt.
    pub session_uid: String,
    pub started_at: DateTime,
    /// Set exactly once, from an explicit end event or implicitly after the
    /// idle grace window.
    pub ended_at: Option<DateTime>,
    #[serde(default)]
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Open,
    Closed,
}

impl MeetingSession {
    pub const COLLECTION: &'static str = "sessions";
}
