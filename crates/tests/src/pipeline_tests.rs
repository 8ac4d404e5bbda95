//! Consumer and reconciler working against the same staging area, end to
//! end: events in arbitrary order on one side, attributed durable rows on
//! the other.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use meetscribe_config::Settings;
use meetscribe_db::models::{Platform, SpeakerStatus};
use meetscribe_services::filter::FilterEngine;
use meetscribe_services::reconcile::Reconciler;
use meetscribe_services::stage::StageStore;
use meetscribe_services::stream::{EventLog, Resolver};
use meetscribe_services::StreamConsumer;
use tokio::sync::watch;

use crate::fixtures::events;
use crate::fixtures::memory::{MemoryDirectory, MemoryEventLog, MemorySink, MemoryStageStore};

const UID: &str = "sess-e2e";

#[tokio::test]
async fn events_in_arbitrary_order_become_an_attributed_transcript() {
    let settings = Settings::default();
    let log = Arc::new(MemoryEventLog::new());
    let stage = Arc::new(MemoryStageStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let sink = Arc::new(MemorySink::new());

    let account_id = directory.add_token(events::TOKEN);
    directory.add_meeting(account_id, Platform::GoogleMeet, events::MEETING);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let resolver = Arc::new(Resolver::new(
        directory.clone(),
        StdDuration::from_secs(30),
    ));
    let consumer = StreamConsumer::new(
        log.clone(),
        stage.clone(),
        resolver,
        settings.stream.clone(),
        shutdown_rx.clone(),
    );
    let filter = Arc::new(FilterEngine::from_settings(&settings.filter).unwrap());
    let reconciler = Reconciler::new(
        stage.clone(),
        sink.clone(),
        filter,
        settings.reconciler.clone(),
        shutdown_rx,
    );

    // Transcription and speaker activity land before their session_start.
    log.push(events::transcription(UID, &[(1.0, 2.0, "good morning all")]));
    log.push(events::speaker_activity(UID, "SPEAKER_START", "Ada", 0.0));
    log.push(events::session_start(UID, "2026-08-29T10:00:00Z"));
    log.push(events::speaker_activity(UID, "SPEAKER_END", "Ada", 3000.0));
    log.push(events::transcription(
        UID,
        &[(4.0, 5.5, "closing remarks next"), (6.0, 6.2, "[BLANK_AUDIO]")],
    ));
    log.push(events::session_end(UID, Some("2026-08-29T10:30:00Z")));

    // First pass defers everything that arrived ahead of the start.
    let entries = log.read(100, 0).await.unwrap();
    consumer.process_batch(&entries).await;
    consumer.process_batch(&log.pending_entries()).await;
    assert!(log.pending_entries().is_empty());

    // Mirror the durable session the directory now holds.
    let session = directory.session(UID).unwrap();
    sink.open_session(UID, session.started_at);
    sink.close_session(UID, session.ended_at.unwrap());

    reconciler.tick(Utc::now() + Duration::seconds(60)).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2, "blank audio must not be persisted");

    let first = sink.record(UID, 1000).unwrap();
    assert_eq!(first.text, "good morning all");
    assert_eq!(first.speaker_status, SpeakerStatus::Mapped);
    assert_eq!(first.speaker_name.as_deref(), Some("Ada"));

    let second = sink.record(UID, 4000).unwrap();
    assert_eq!(second.text, "closing remarks next");
    assert_eq!(second.speaker_status, SpeakerStatus::Unknown);

    // Closed and drained: staging fully torn down.
    assert!(stage.active_sessions().await.unwrap().is_empty());
    assert_eq!(stage.staged_count(UID), 0);

    drop(shutdown_tx);
}
