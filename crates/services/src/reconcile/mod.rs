pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use meetscribe_config::ReconcilerSettings;
use meetscribe_db::models::{SpeakerStatus, TranscriptSegment};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::correlate;
use crate::filter::FilterEngine;
use crate::stage::{ActiveSession, StageStore, StagedSegment};

pub use sink::MongoSink;

/// The durable view of a session, as needed by reconciliation: which meeting
/// it belongs to and whether (and when) it ended.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    pub meeting_id: ObjectId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub closed: bool,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("durable store error: {0}")]
    Dao(#[from] crate::dao::DaoError),
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage as the reconciler sees it. Commits must be idempotent on
/// the (`session_uid`, `relative_start_ms`) identity so a batch interrupted
/// mid-way can be resubmitted whole.
#[async_trait::async_trait]
pub trait DurableSink: Send + Sync {
    async fn commit(&self, records: &[TranscriptSegment]) -> Result<usize, SinkError>;

    async fn session_window(&self, session_uid: &str) -> Result<Option<SessionWindow>, SinkError>;

    /// Closes a session that stopped writing without an explicit end event.
    /// Returns `false` when it was already closed.
    async fn close_idle_session(
        &self,
        session_uid: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, SinkError>;
}

/// Moves settled staged segments into durable storage.
///
/// Each tick walks the active sessions. Segments untouched for longer than
/// the immutability threshold (or belonging to a closed session) are
/// correlated with buffered speaker activity, run through the filter and
/// committed; only a successful commit evicts them from staging, so a crash
/// at any point replays the same batch next tick. A session whose staging is
/// drained is torn down, with an implicit close first if it went silent
/// without a session end.
pub struct Reconciler {
    stage: Arc<dyn StageStore>,
    sink: Arc<dyn DurableSink>,
    filter: Arc<FilterEngine>,
    settings: ReconcilerSettings,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        stage: Arc<dyn StageStore>,
        sink: Arc<dyn DurableSink>,
        filter: Arc<FilterEngine>,
        settings: ReconcilerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stage,
            sink,
            filter,
            settings,
            shutdown,
        }
    }

    pub async fn run(&self) {
        let mut shutdown = self.shutdown.clone();
        let mut tick =
            tokio::time::interval(Duration::from_secs(self.settings.tick_interval_secs));
        info!(
            tick_secs = self.settings.tick_interval_secs,
            threshold_secs = self.settings.immutability_threshold_secs,
            "Reconciler started"
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Reconciler stopping");
                    return;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Reconciliation tick failed");
                    }
                }
            }
        }
    }

    /// One full pass over the active sessions. A failure in one session is
    /// logged and does not stop the others; its staged data is retried next
    /// tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), ReconcileError> {
        let sessions = self.stage.active_sessions().await?;
        for session in sessions {
            if let Err(e) = self.reconcile_session(&session, now).await {
                warn!(uid = %session.session_uid, error = %e, "Session reconciliation failed");
            }
        }
        Ok(())
    }

    async fn reconcile_session(
        &self,
        session: &ActiveSession,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        let uid = &session.session_uid;
        let Some(window) = self.sink.session_window(uid).await? else {
            // Staged data for a session the durable store has never seen;
            // leave it for the consumer path to resolve.
            debug!(uid = %uid, "Active session not yet durable, skipping");
            return Ok(());
        };

        let segments = self.stage.segments(uid).await?;
        let threshold = chrono::Duration::seconds(self.settings.immutability_threshold_secs as i64);
        let candidates: Vec<&StagedSegment> = segments
            .iter()
            .filter(|s| window.closed || now - s.updated_at >= threshold)
            .collect();

        if !candidates.is_empty() {
            self.settle(uid, &window, &segments, &candidates).await?;
        }

        let remaining = segments.len() - candidates.len();
        if remaining == 0 {
            self.teardown_if_done(session, &window, now).await?;
        }
        Ok(())
    }

    /// Correlates, filters and commits one batch of settled candidates, then
    /// evicts them from staging. Filtered segments are evicted without being
    /// persisted.
    async fn settle(
        &self,
        uid: &str,
        window: &SessionWindow,
        all_segments: &[StagedSegment],
        candidates: &[&StagedSegment],
    ) -> Result<(), ReconcileError> {
        let events = self.stage.speaker_events(uid).await?;

        let session_end_rel_ms = window
            .ended_at
            .map(|ended| (ended - window.started_at).num_milliseconds());
        let latest_observed_ms = all_segments
            .iter()
            .map(|s| s.relative_end_ms)
            .chain(events.iter().map(|e| e.relative_timestamp_ms))
            .max()
            .unwrap_or(0);

        let mut records = Vec::new();
        let mut evict = Vec::with_capacity(candidates.len());
        for segment in candidates {
            evict.push(segment.relative_start_ms);
            if !self.filter.keep(&segment.text, segment.language.as_deref()) {
                continue;
            }
            let attribution = match correlate::correlate_segment(
                &events,
                segment.relative_start_ms,
                segment.relative_end_ms,
                session_end_rel_ms,
                latest_observed_ms,
            ) {
                Ok(attribution) => attribution,
                // The segment itself is good; persist it unattributed.
                Err(e) => {
                    warn!(uid = %uid, error = %e, "Speaker correlation failed");
                    correlate::Attribution {
                        status: SpeakerStatus::Error,
                        speaker_name: None,
                    }
                }
            };
            records.push(TranscriptSegment {
                id: None,
                meeting_id: window.meeting_id,
                session_uid: uid.to_string(),
                relative_start_ms: segment.relative_start_ms,
                relative_end_ms: segment.relative_end_ms,
                text: segment.text.trim().to_string(),
                language: segment.language.clone(),
                speaker_name: attribution.speaker_name,
                speaker_status: attribution.status,
                created_at: bson::DateTime::now(),
                updated_at: bson::DateTime::now(),
            });
        }

        if !records.is_empty() {
            let committed = self.sink.commit(&records).await?;
            debug!(uid = %uid, committed, filtered = evict.len() - records.len(), "Settled batch");
        }
        // Eviction only after the commit held; on commit failure we returned
        // above and the batch replays next tick.
        self.stage.remove_segments(uid, &evict).await?;
        Ok(())
    }

    /// With staging drained, decide whether the session is finished: closed
    /// sessions are torn down immediately, open ones only after the idle
    /// grace window, with `ended_at` pinned to last write plus grace.
    async fn teardown_if_done(
        &self,
        session: &ActiveSession,
        window: &SessionWindow,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        let uid = &session.session_uid;
        if window.closed {
            self.stage.deactivate(uid).await?;
            info!(uid = %uid, "Session fully reconciled");
            return Ok(());
        }

        let grace_ms = self.settings.session_idle_grace_secs as i64 * 1000;
        let idle_ms = now.timestamp_millis() - session.last_write_ms;
        if idle_ms > grace_ms {
            let ended_at = DateTime::from_timestamp_millis(session.last_write_ms + grace_ms)
                .unwrap_or(now);
            if self.sink.close_idle_session(uid, ended_at).await? {
                info!(uid = %uid, idle_secs = idle_ms / 1000, "Closed idle session");
            }
            self.stage.deactivate(uid).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Stage(#[from] crate::stage::StageError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
