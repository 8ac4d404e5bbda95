use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use meetscribe_db::models::TranscriptSegment;
use tracing::debug;

use super::base::{BaseDao, DaoResult};

pub struct TranscriptDao {
    pub base: BaseDao<TranscriptSegment>,
}

impl TranscriptDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, TranscriptSegment::COLLECTION),
        }
    }

    /// Commits a reconciled batch with upsert semantics on the
    /// (`session_uid`, `relative_start_ms`) identity. Any failure aborts the
    /// batch; because every write is an idempotent upsert, the whole batch is
    /// safe to resubmit on the next reconciliation tick.
    pub async fn upsert_batch(&self, records: &[TranscriptSegment]) -> DaoResult<usize> {
        for record in records {
            self.base
                .upsert_one(
                    doc! {
                        "session_uid": &record.session_uid,
                        "relative_start_ms": record.relative_start_ms,
                    },
                    doc! {
                        "$set": {
                            "meeting_id": record.meeting_id,
                            "relative_end_ms": record.relative_end_ms,
                            "text": &record.text,
                            "language": record.language.as_deref(),
                            "speaker_name": record.speaker_name.as_deref(),
                            "speaker_status": bson::to_bson(&record.speaker_status)?,
                            "updated_at": record.updated_at,
                        },
                        "$setOnInsert": {
                            "created_at": DateTime::now(),
                        },
                    },
                )
                .await?;
        }
        debug!(count = records.len(), "Committed transcript batch");
        Ok(records.len())
    }

    pub async fn for_meeting(&self, meeting_id: ObjectId) -> DaoResult<Vec<TranscriptSegment>> {
        self.base
            .find_many(
                doc! { "meeting_id": meeting_id },
                Some(doc! { "session_uid": 1, "relative_start_ms": 1 }),
            )
            .await
    }
}
