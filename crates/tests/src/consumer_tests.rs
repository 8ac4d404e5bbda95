use std::sync::Arc;
use std::time::Duration;

use meetscribe_config::Settings;
use meetscribe_db::models::Platform;
use meetscribe_services::StreamConsumer;
use meetscribe_services::stage::{SpeakerEventKind, StageStore};
use meetscribe_services::stream::{EventLog, Outcome, Resolver};
use tokio::sync::watch;

use crate::fixtures::events;
use crate::fixtures::memory::{MemoryDirectory, MemoryEventLog, MemoryStageStore};

struct Harness {
    log: Arc<MemoryEventLog>,
    stage: Arc<MemoryStageStore>,
    directory: Arc<MemoryDirectory>,
    consumer: StreamConsumer,
    _shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let log = Arc::new(MemoryEventLog::new());
    let stage = Arc::new(MemoryStageStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let account_id = directory.add_token(events::TOKEN);
    directory.add_meeting(account_id, Platform::GoogleMeet, events::MEETING);

    let resolver = Arc::new(Resolver::new(
        directory.clone(),
        Duration::from_secs(30),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = StreamConsumer::new(
        log.clone(),
        stage.clone(),
        resolver,
        Settings::default().stream,
        shutdown_rx,
    );
    Harness {
        log,
        stage,
        directory,
        consumer,
        _shutdown: shutdown_tx,
    }
}

async fn process_new(h: &Harness) {
    let entries = h.log.read(100, 0).await.unwrap();
    h.consumer.process_batch(&entries).await;
}

/// Runs the unacked entries through again, as the log would on redelivery.
async fn redeliver(h: &Harness) {
    let entries = h.log.pending_entries();
    h.consumer.process_batch(&entries).await;
}

const UID: &str = "sess-1";
const STARTED: &str = "2026-08-29T10:00:00Z";

#[tokio::test]
async fn stages_segments_once_session_is_open() {
    let h = harness();
    h.log.push(events::session_start(UID, STARTED));
    h.log
        .push(events::transcription(UID, &[(1.0, 2.5, "hello world")]));

    process_new(&h).await;

    assert!(h.directory.session(UID).is_some());
    let staged = h.stage.segments(UID).await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].relative_start_ms, 1000);
    assert_eq!(staged[0].relative_end_ms, 2500);
    assert_eq!(staged[0].text, "hello world");
    assert_eq!(h.log.acked_ids().len(), 2);
    assert!(h.log.pending_entries().is_empty());
}

#[tokio::test]
async fn transcription_before_session_start_is_deferred_until_it_lands() {
    let h = harness();
    h.log
        .push(events::transcription(UID, &[(0.0, 1.0, "early bird")]));

    process_new(&h).await;
    assert_eq!(h.stage.staged_count(UID), 0);
    assert!(h.log.acked_ids().is_empty());
    assert_eq!(h.log.pending_entries().len(), 1);

    h.log.push(events::session_start(UID, STARTED));
    process_new(&h).await;
    redeliver(&h).await;

    assert_eq!(h.stage.staged_count(UID), 1);
    assert!(h.log.pending_entries().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_acked_and_dropped() {
    let h = harness();
    h.log.push("this is not json");
    h.log.push(r#"{"type": "transcription"}"#);

    process_new(&h).await;

    assert_eq!(h.log.acked_ids().len(), 2);
    assert_eq!(h.stage.staged_count(UID), 0);
}

#[tokio::test]
async fn unknown_token_is_dropped_not_retried() {
    let h = harness();
    let payload = events::transcription(UID, &[(0.0, 1.0, "who are you")]);
    h.log.push(events::with_token(&payload, "not-a-token"));

    process_new(&h).await;

    assert_eq!(h.log.acked_ids().len(), 1);
    assert_eq!(h.stage.staged_count(UID), 0);
}

#[tokio::test]
async fn unknown_platform_is_dropped() {
    let h = harness();
    let payload = events::session_start(UID, STARTED);
    h.log.push(events::with_platform(&payload, "webex"));

    process_new(&h).await;

    assert_eq!(h.log.acked_ids().len(), 1);
    assert!(h.directory.session(UID).is_none());
}

#[tokio::test]
async fn meeting_never_requested_is_dropped() {
    let h = harness();
    let payload = events::session_start(UID, STARTED);
    h.log.push(events::with_meeting(&payload, "zzz-zzzz-zzz"));

    process_new(&h).await;

    assert_eq!(h.log.acked_ids().len(), 1);
    assert!(h.directory.session(UID).is_none());
}

#[tokio::test]
async fn duplicate_delivery_overwrites_instead_of_duplicating() {
    let h = harness();
    h.log.push(events::session_start(UID, STARTED));
    process_new(&h).await;

    h.log
        .push(events::transcription(UID, &[(3.0, 4.0, "say it once")]));
    let entries = h.log.read(100, 0).await.unwrap();
    assert_eq!(
        h.consumer.process_entry(&entries[0]).await,
        Outcome::Complete
    );
    assert_eq!(
        h.consumer.process_entry(&entries[0]).await,
        Outcome::Complete
    );

    assert_eq!(h.stage.staged_count(UID), 1);
}

#[tokio::test]
async fn invalid_segment_intervals_are_skipped_without_failing_the_envelope() {
    let h = harness();
    h.log.push(events::session_start(UID, STARTED));
    h.log
        .push(events::transcription(UID, &[(2.0, 1.0, "backwards")]));
    // No interval at all on the second segment.
    h.log.push(
        serde_json::json!({
            "type": "transcription",
            "uid": UID,
            "token": events::TOKEN,
            "platform": events::PLATFORM,
            "meeting_id": events::MEETING,
            "segments": [
                { "start": 5.0, "end": 6.0, "text": "kept" },
                { "text": "no interval" },
            ],
        })
        .to_string(),
    );

    process_new(&h).await;

    let staged = h.stage.segments(UID).await.unwrap();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].text, "kept");
    assert_eq!(h.log.acked_ids().len(), 3);
}

#[tokio::test]
async fn speaker_activity_is_buffered_on_the_session_timeline() {
    let h = harness();
    h.log.push(events::session_start(UID, STARTED));
    h.log
        .push(events::speaker_activity(UID, "SPEAKER_START", "Ada", 1000.0));
    h.log
        .push(events::speaker_activity(UID, "SPEAKER_END", "Ada", 4000.0));

    process_new(&h).await;

    let events = h.stage.speaker_events(UID).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, SpeakerEventKind::Start);
    assert_eq!(events[0].relative_timestamp_ms, 1000);
    assert_eq!(events[1].kind, SpeakerEventKind::End);
}

#[tokio::test]
async fn session_end_closes_exactly_once() {
    let h = harness();
    h.log.push(events::session_start(UID, STARTED));
    h.log
        .push(events::session_end(UID, Some("2026-08-29T11:00:00Z")));
    h.log
        .push(events::session_end(UID, Some("2026-08-29T12:00:00Z")));

    process_new(&h).await;

    let session = h.directory.session(UID).unwrap();
    let ended_at = session.ended_at.unwrap();
    assert_eq!(ended_at.to_rfc3339(), "2026-08-29T11:00:00+00:00");
    assert_eq!(h.log.acked_ids().len(), 3);
}

#[tokio::test]
async fn session_end_before_start_is_deferred() {
    let h = harness();
    h.log.push(events::session_end(UID, None));

    process_new(&h).await;

    assert!(h.log.acked_ids().is_empty());
    assert_eq!(h.log.pending_entries().len(), 1);
}

#[tokio::test]
async fn repeated_redelivery_is_counted_up_to_the_warn_threshold() {
    let h = harness();
    let warn_after = Settings::default().stream.defer_warn_after;
    h.log
        .push(events::transcription(UID, &[(0.0, 1.0, "stuck without a session")]));

    process_new(&h).await;
    for _ in 1..warn_after {
        redeliver(&h).await;
    }

    let entry_id = h.log.pending_entries()[0].id.clone();
    assert_eq!(h.consumer.deferred_attempts(&entry_id), warn_after);

    // Once the session lands the entry settles and the count is dropped.
    h.log.push(events::session_start(UID, STARTED));
    process_new(&h).await;
    redeliver(&h).await;

    assert!(h.log.pending_entries().is_empty());
    assert_eq!(h.consumer.deferred_attempts(&entry_id), 0);
}

#[tokio::test]
async fn transient_directory_failure_defers_and_recovers() {
    let h = harness();
    h.directory.set_failing(true);
    h.log.push(events::session_start(UID, STARTED));

    process_new(&h).await;
    assert!(h.log.acked_ids().is_empty());
    assert!(h.directory.session(UID).is_none());

    h.directory.set_failing(false);
    redeliver(&h).await;

    assert_eq!(h.log.acked_ids().len(), 1);
    assert!(h.directory.session(UID).is_some());
}
