use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use meetscribe_config::StreamSettings;
use meetscribe_db::models::Platform;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::stage::{SpeakerEvent, StageStore, StagedSegment};
use crate::stream::decoder::{self, Envelope, EventScope};
use crate::stream::log::{EventLog, LogEntry};
use crate::stream::resolver::Resolver;

/// What to do with a log entry after processing.
///
/// `Complete` and `Discard` both acknowledge the entry; the difference is
/// logging. `Defer` leaves the entry pending so the log redelivers it, used
/// when the entry is valid but not yet resolvable (its `session_start` has
/// not been processed) or when a dependency failed transiently. Deferring
/// instead of dropping is what makes ingestion order-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Discard,
    Defer,
}

pub struct StreamConsumer {
    log: Arc<dyn EventLog>,
    stage: Arc<dyn StageStore>,
    resolver: Arc<Resolver>,
    settings: StreamSettings,
    shutdown: watch::Receiver<bool>,
    /// Redelivery counts per entry id, for escalating stuck entries to WARN.
    defer_counts: DashMap<String, u32>,
}

impl StreamConsumer {
    pub fn new(
        log: Arc<dyn EventLog>,
        stage: Arc<dyn StageStore>,
        resolver: Arc<Resolver>,
        settings: StreamSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            log,
            stage,
            resolver,
            settings,
            shutdown,
            defer_counts: DashMap::new(),
        }
    }

    /// Main ingestion loop: blocking group reads until shutdown.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.clone();
        info!(
            stream = %self.settings.stream_name,
            group = %self.settings.consumer_group,
            "Consumer started"
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Consumer stopping");
                    return;
                }
                read = self.log.read(self.settings.read_count, self.settings.block_ms) => {
                    match read {
                        Ok(entries) => self.process_batch(&entries).await,
                        Err(e) => {
                            error!(error = %e, "Event log read failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    /// Periodically claims entries abandoned by dead consumers and runs them
    /// through the same processing path.
    pub async fn run_reclaim(&self) {
        let mut shutdown = self.shutdown.clone();
        let mut tick =
            tokio::time::interval(Duration::from_secs(self.settings.reclaim_interval_secs));
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tick.tick() => {
                    match self.log.reclaim_stale(self.settings.reclaim_idle_ms).await {
                        Ok(entries) if !entries.is_empty() => {
                            info!(count = entries.len(), "Reclaimed stale entries");
                            self.process_batch(&entries).await;
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Reclaim failed"),
                    }
                }
            }
        }
    }

    /// Processes a batch and acknowledges everything that is settled. Ack
    /// failures are logged and left alone: the entries redeliver and every
    /// handler is idempotent.
    pub async fn process_batch(&self, entries: &[LogEntry]) {
        let mut settled = Vec::new();
        for entry in entries {
            match self.process_entry(entry).await {
                Outcome::Complete | Outcome::Discard => {
                    self.defer_counts.remove(&entry.id);
                    settled.push(entry.id.clone());
                }
                Outcome::Defer => self.note_deferred(entry),
            }
        }
        if let Err(e) = self.log.ack(&settled).await {
            error!(error = %e, count = settled.len(), "Failed to ack settled entries");
        }
    }

    pub async fn process_entry(&self, entry: &LogEntry) -> Outcome {
        let envelope = match decoder::decode(&entry.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Dropping malformed entry");
                return Outcome::Discard;
            }
        };

        match envelope {
            Envelope::SessionStart {
                scope,
                start_timestamp,
            } => self.handle_session_start(&scope, &start_timestamp).await,
            Envelope::Transcription { scope, segments } => {
                self.handle_transcription(&scope, &segments).await
            }
            Envelope::SessionEnd {
                scope,
                end_timestamp,
            } => self.handle_session_end(&scope, end_timestamp.as_deref()).await,
            Envelope::SpeakerActivity {
                scope,
                event_type,
                participant_name,
                participant_id,
                relative_timestamp_ms,
            } => {
                let event = SpeakerEvent {
                    session_uid: scope.uid.clone(),
                    participant_id,
                    participant_name,
                    kind: event_type.into(),
                    relative_timestamp_ms: relative_timestamp_ms.round() as i64,
                };
                self.handle_speaker_activity(&scope, event).await
            }
        }
    }

    async fn handle_session_start(&self, scope: &EventScope, start_timestamp: &str) -> Outcome {
        let Some(started_at) = decoder::parse_timestamp(start_timestamp) else {
            warn!(uid = %scope.uid, raw = start_timestamp, "Dropping session_start with unparseable timestamp");
            return Outcome::Discard;
        };
        let meeting_id = match self.resolve_meeting(scope).await {
            Resolved::Meeting(id) => id,
            Resolved::Rejected => return Outcome::Discard,
            Resolved::Transient => return Outcome::Defer,
        };
        match self
            .resolver
            .open_session(meeting_id, &scope.uid, started_at)
            .await
        {
            Ok(()) => {
                info!(uid = %scope.uid, %meeting_id, "Session opened");
                Outcome::Complete
            }
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Deferring session_start");
                Outcome::Defer
            }
        }
    }

    async fn handle_transcription(
        &self,
        scope: &EventScope,
        segments: &[decoder::WireSegment],
    ) -> Outcome {
        match self.resolve_meeting(scope).await {
            Resolved::Meeting(_) => {}
            Resolved::Rejected => return Outcome::Discard,
            Resolved::Transient => return Outcome::Defer,
        }
        match self.resolver.session_exists(&scope.uid).await {
            Ok(true) => {}
            // The session_start has not landed yet; redeliver until it does.
            Ok(false) => return Outcome::Defer,
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Deferring transcription");
                return Outcome::Defer;
            }
        }

        let now = Utc::now();
        let staged: Vec<StagedSegment> = segments
            .iter()
            .filter_map(|segment| {
                let start = segment.start?;
                let end = segment.end?;
                let text = segment.text.clone()?;
                let relative_start_ms = decoder::secs_to_ms(start);
                let relative_end_ms = decoder::secs_to_ms(end);
                if relative_end_ms < relative_start_ms {
                    debug!(uid = %scope.uid, relative_start_ms, relative_end_ms, "Skipping inverted segment interval");
                    return None;
                }
                Some(StagedSegment {
                    session_uid: scope.uid.clone(),
                    relative_start_ms,
                    relative_end_ms,
                    text,
                    language: segment.language.clone(),
                    updated_at: now,
                })
            })
            .collect();

        if staged.is_empty() {
            return Outcome::Complete;
        }
        match self.stage.upsert_segments(&scope.uid, &staged).await {
            Ok(()) => {
                debug!(uid = %scope.uid, count = staged.len(), "Staged segments");
                Outcome::Complete
            }
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Deferring transcription after staging failure");
                Outcome::Defer
            }
        }
    }

    async fn handle_session_end(&self, scope: &EventScope, end_timestamp: Option<&str>) -> Outcome {
        match self.resolve_meeting(scope).await {
            Resolved::Meeting(_) => {}
            Resolved::Rejected => return Outcome::Discard,
            Resolved::Transient => return Outcome::Defer,
        }
        match self.resolver.session_exists(&scope.uid).await {
            Ok(true) => {}
            Ok(false) => return Outcome::Defer,
            Err(_) => return Outcome::Defer,
        }
        let ended_at = end_timestamp
            .and_then(decoder::parse_timestamp)
            .unwrap_or_else(Utc::now);
        match self.resolver.close_session(&scope.uid, ended_at).await {
            Ok(closed) => {
                if closed {
                    info!(uid = %scope.uid, "Session closed");
                } else {
                    debug!(uid = %scope.uid, "Session already closed");
                }
                Outcome::Complete
            }
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Deferring session_end");
                Outcome::Defer
            }
        }
    }

    async fn handle_speaker_activity(&self, scope: &EventScope, event: SpeakerEvent) -> Outcome {
        match self.resolve_meeting(scope).await {
            Resolved::Meeting(_) => {}
            Resolved::Rejected => return Outcome::Discard,
            Resolved::Transient => return Outcome::Defer,
        }
        match self.resolver.session_exists(&scope.uid).await {
            Ok(true) => {}
            Ok(false) => return Outcome::Defer,
            Err(_) => return Outcome::Defer,
        }
        match self.stage.push_speaker_event(&event).await {
            Ok(()) => Outcome::Complete,
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Deferring speaker activity");
                Outcome::Defer
            }
        }
    }

    /// Shared authorization and meeting lookup. Unknown token, unparseable
    /// platform and unknown meeting are permanent rejections; a directory
    /// failure is transient.
    async fn resolve_meeting(&self, scope: &EventScope) -> Resolved {
        let Ok(platform) = scope.platform.parse::<Platform>() else {
            warn!(uid = %scope.uid, platform = %scope.platform, "Dropping entry for unknown platform");
            return Resolved::Rejected;
        };
        let account_id = match self.resolver.account_id(&scope.token).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(uid = %scope.uid, "Dropping entry with unknown token");
                return Resolved::Rejected;
            }
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Token lookup failed");
                return Resolved::Transient;
            }
        };
        match self
            .resolver
            .meeting_id(account_id, platform, &scope.meeting_id)
            .await
        {
            Ok(Some(id)) => Resolved::Meeting(id),
            Ok(None) => {
                warn!(
                    uid = %scope.uid,
                    external_id = %scope.meeting_id,
                    "Dropping entry for meeting never requested by this account"
                );
                Resolved::Rejected
            }
            Err(e) => {
                warn!(uid = %scope.uid, error = %e, "Meeting lookup failed");
                Resolved::Transient
            }
        }
    }

    /// Redelivery attempts recorded for a still-pending entry. Resets to
    /// zero once the entry settles.
    pub fn deferred_attempts(&self, entry_id: &str) -> u32 {
        self.defer_counts
            .get(entry_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    fn note_deferred(&self, entry: &LogEntry) {
        let mut count = self.defer_counts.entry(entry.id.clone()).or_insert(0);
        *count += 1;
        if *count >= self.settings.defer_warn_after {
            warn!(
                id = %entry.id,
                redeliveries = *count,
                "Entry still unresolvable after repeated redelivery"
            );
        }
    }
}

enum Resolved {
    Meeting(bson::oid::ObjectId),
    Rejected,
    Transient,
}
