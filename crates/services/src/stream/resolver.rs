use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meetscribe_db::models::Platform;
use thiserror::Error;
use tracing::debug;

use crate::dao::{AccountDao, DaoError, MeetingDao, SessionDao};

/// Any directory failure is treated as transient: the consumer defers the
/// entry instead of acking it, and the lookup is retried on redelivery.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory lookup failed: {0}")]
    Dao(#[from] DaoError),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Raw directory lookups against durable storage. Split from [`Resolver`] so
/// the caching layer can be tested without a database.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn account_by_token(&self, token: &str) -> Result<Option<ObjectId>, DirectoryError>;

    /// Latest meeting for (account, platform, external id), or `None` when
    /// the bot was never requested for that meeting.
    async fn latest_meeting(
        &self,
        account_id: ObjectId,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<ObjectId>, DirectoryError>;

    /// Opens (or refreshes) the session row and flips its meeting to active.
    async fn open_session(
        &self,
        meeting_id: ObjectId,
        session_uid: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;

    /// Closes the session once and marks its meeting completed. Returns
    /// `false` when the session was already closed.
    async fn close_session(
        &self,
        session_uid: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, DirectoryError>;

    async fn session_exists(&self, session_uid: &str) -> Result<bool, DirectoryError>;
}

pub struct MongoDirectory {
    accounts: AccountDao,
    meetings: MeetingDao,
    sessions: SessionDao,
}

impl MongoDirectory {
    pub fn new(accounts: AccountDao, meetings: MeetingDao, sessions: SessionDao) -> Self {
        Self {
            accounts,
            meetings,
            sessions,
        }
    }
}

#[async_trait]
impl Directory for MongoDirectory {
    async fn account_by_token(&self, token: &str) -> Result<Option<ObjectId>, DirectoryError> {
        let account = self.accounts.by_token(token).await?;
        Ok(account.and_then(|a| a.id))
    }

    async fn latest_meeting(
        &self,
        account_id: ObjectId,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<ObjectId>, DirectoryError> {
        let meeting = self
            .meetings
            .latest(account_id, platform, external_id)
            .await?;
        Ok(meeting.and_then(|m| m.id))
    }

    async fn open_session(
        &self,
        meeting_id: ObjectId,
        session_uid: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let started_at = bson::DateTime::from_chrono(started_at);
        self.sessions
            .open(meeting_id, session_uid, started_at)
            .await?;
        self.meetings.mark_active(meeting_id, started_at).await?;
        Ok(())
    }

    async fn close_session(
        &self,
        session_uid: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, DirectoryError> {
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

    async fn session_exists(&self, session_uid: &str) -> Result<bool, DirectoryError> {
        Ok(self.sessions.by_uid(session_uid).await?.is_some())
    }
}

/// Positive-result cache with per-entry expiry. Negative results are never
/// cached: a token created or a session opened moments later must be seen on
/// the next lookup.
struct TtlCache<V> {
    entries: DashMap<String, (Instant, V)>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            let (inserted, value) = entry.value();
            if inserted.elapsed() < self.ttl {
                return Some(value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    fn insert(&self, key: String, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }
}

/// Caching front for the directory. Every hot-path entry (transcription,
/// speaker activity) resolves token, meeting and session; without the cache
/// that is three storage round-trips per entry.
pub struct Resolver {
    directory: Arc<dyn Directory>,
    accounts: TtlCache<ObjectId>,
    meetings: TtlCache<ObjectId>,
    sessions: TtlCache<()>,
}

impl Resolver {
    pub fn new(directory: Arc<dyn Directory>, cache_ttl: Duration) -> Self {
        Self {
            directory,
            accounts: TtlCache::new(cache_ttl),
            meetings: TtlCache::new(cache_ttl),
            sessions: TtlCache::new(cache_ttl),
        }
    }

    pub async fn account_id(&self, token: &str) -> Result<Option<ObjectId>, DirectoryError> {
        if let Some(id) = self.accounts.get(token) {
            return Ok(Some(id));
        }
        let id = self.directory.account_by_token(token).await?;
        if let Some(id) = id {
            self.accounts.insert(token.to_string(), id);
        }
        Ok(id)
    }

    pub async fn meeting_id(
        &self,
        account_id: ObjectId,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<ObjectId>, DirectoryError> {
        let key = format!("{account_id}:{platform}:{external_id}");
        if let Some(id) = self.meetings.get(&key) {
            return Ok(Some(id));
        }
        let id = self
            .directory
            .latest_meeting(account_id, platform, external_id)
            .await?;
        if let Some(id) = id {
            self.meetings.insert(key, id);
        }
        Ok(id)
    }

    pub async fn open_session(
        &self,
        meeting_id: ObjectId,
        session_uid: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        self.directory
            .open_session(meeting_id, session_uid, started_at)
            .await?;
        self.sessions.insert(session_uid.to_string(), ());
        debug!(session_uid, %meeting_id, "Opened session");
        Ok(())
    }

    pub async fn close_session(
        &self,
        session_uid: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, DirectoryError> {
        self.directory.close_session(session_uid, ended_at).await
    }

    pub async fn session_exists(&self, session_uid: &str) -> Result<bool, DirectoryError> {
        if self.sessions.get(session_uid).is_some() {
            return Ok(true);
        }
        let exists = self.directory.session_exists(session_uid).await?;
        if exists {
            self.sessions.insert(session_uid.to_string(), ());
        }
        Ok(exists)
    }
}
