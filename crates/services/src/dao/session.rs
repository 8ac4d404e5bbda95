use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use meetscribe_db::models::{MeetingSession, SessionStatus};

use super::base::{BaseDao, DaoResult};

pub struct SessionDao {
    pub base: BaseDao<MeetingSession>,
}

impl SessionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, MeetingSession::COLLECTION),
        }
    }

    /// Creates the session row, or refreshes `started_at` if a redelivered
    /// `session_start` arrives for an existing one. Idempotent.
    pub async fn open(
        &self,
        meeting_id: ObjectId,
        session_uid: &str,
        started_at: DateTime,
    ) -> DaoResult<()> {
        self.base
            .upsert_one(
                doc! { "session_uid": session_uid },
                doc! {
                    "$set": {
                        "meeting_id": meeting_id,
                        "started_at": started_at,
                    },
                    "$setOnInsert": {
                        "status": bson::to_bson(&SessionStatus::Open)?,
                        "ended_at": null,
                    },
                },
            )
            .await
    }

    /// Sets `ended_at` exactly once: the `ended_at: null` guard makes a
    /// redelivered or implicit close a no-op.
    pub async fn close(&self, session_uid: &str, ended_at: DateTime) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "session_uid": session_uid, "ended_at": null },
                doc! { "$set": {
                    "ended_at": ended_at,
                    "status": bson::to_bson(&SessionStatus::Closed)?,
                } },
            )
            .await
    }

    pub async fn by_uid(&self, session_uid: &str) -> DaoResult<Option<MeetingSession>> {
        self.base
            .find_one(doc! { "session_uid": session_uid })
            .await
    }

    pub async fn for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<MeetingSession>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id },
                Some(doc! { "started_at": 1 }),
            )
            .await
    }
}
