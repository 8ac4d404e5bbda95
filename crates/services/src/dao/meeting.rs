use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use meetscribe_db::models::{Meeting, MeetingStatus, Platform};

use super::base::{BaseDao, DaoResult, PaginatedResult, PaginationParams};

pub struct MeetingDao {
    pub base: BaseDao<Meeting>,
}

impl MeetingDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Meeting::COLLECTION),
        }
    }

    /// The latest meeting record for (account, platform, external id).
    /// Rebooking the same external meeting creates a new record, so "latest"
    /// is the one new sessions attach to.
    pub async fn latest(
        &self,
        account_id: ObjectId,
        platform: Platform,
        external_id: &str,
    ) -> DaoResult<Option<Meeting>> {
        let mut found = self
            .base
            .collection()
            .find(doc! {
                "account_id": account_id,
                "platform": bson::to_bson(&platform)?,
                "external_id": external_id,
            })
            .sort(doc! { "created_at": -1 })
            .limit(1)
            .await?;

        use futures::TryStreamExt;
        Ok(found.try_next().await?)
    }

    pub async fn list_for_account(
        &self,
        account_id: ObjectId,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Meeting>> {
        self.base
            .find_paginated(
                doc! { "account_id": account_id },
                Some(doc! { "created_at": -1 }),
                params,
            )
            .await
    }

    /// First session start flips the meeting to active; `started_at` is only
    /// written once.
    pub async fn mark_active(&self, id: ObjectId, started_at: DateTime) -> DaoResult<()> {
        self.base
            .update_one(
                doc! { "_id": id, "started_at": null },
                doc! { "$set": {
                    "status": bson::to_bson(&MeetingStatus::Active)?,
                    "started_at": started_at,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, id: ObjectId, ended_at: DateTime) -> DaoResult<()> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": bson::to_bson(&MeetingStatus::Completed)?,
                    "ended_at": ended_at,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;
        Ok(())
    }
}
