use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use meetscribe_config::Settings;
use meetscribe_db::models::SpeakerStatus;
use meetscribe_services::filter::FilterEngine;
use meetscribe_services::reconcile::Reconciler;
use meetscribe_services::stage::{SpeakerEvent, SpeakerEventKind, StageStore, StagedSegment};
use tokio::sync::watch;

use crate::fixtures::memory::{MemorySink, MemoryStageStore};

struct Harness {
    stage: Arc<MemoryStageStore>,
    sink: Arc<MemorySink>,
    reconciler: Reconciler,
    _shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let stage = Arc::new(MemoryStageStore::new());
    let sink = Arc::new(MemorySink::new());
    let settings = Settings::default();
    let filter = Arc::new(FilterEngine::from_settings(&settings.filter).unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(
        stage.clone(),
        sink.clone(),
        filter,
        settings.reconciler,
        shutdown_rx,
    );
    Harness {
        stage,
        sink,
        reconciler,
        _shutdown: shutdown_tx,
    }
}

const UID: &str = "sess-1";

/// Far enough in the future that every staged segment has settled, but still
/// inside the idle grace window.
fn settled() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(60)
}

async fn stage_segment(h: &Harness, start_ms: i64, end_ms: i64, text: &str) {
    h.stage
        .upsert_segments(
            UID,
            &[StagedSegment {
                session_uid: UID.to_string(),
                relative_start_ms: start_ms,
                relative_end_ms: end_ms,
                text: text.to_string(),
                language: Some("en".to_string()),
                updated_at: Utc::now(),
            }],
        )
        .await
        .unwrap();
}

async fn stage_speaker(h: &Harness, name: &str, kind: SpeakerEventKind, ts_ms: i64) {
    h.stage
        .push_speaker_event(&SpeakerEvent {
            session_uid: UID.to_string(),
            participant_id: None,
            participant_name: name.to_string(),
            kind,
            relative_timestamp_ms: ts_ms,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn fresh_segments_wait_for_the_immutability_threshold() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    stage_segment(&h, 0, 1500, "still warm").await;

    h.reconciler.tick(Utc::now()).await.unwrap();

    assert!(h.sink.records().is_empty());
    assert_eq!(h.stage.staged_count(UID), 1);
}

#[tokio::test]
async fn settled_segments_commit_and_evict() {
    let h = harness();
    let meeting_id = h.sink.open_session(UID, Utc::now());
    stage_segment(&h, 0, 1500, "all settled here").await;

    h.reconciler.tick(settled()).await.unwrap();

    let record = h.sink.record(UID, 0).expect("committed");
    assert_eq!(record.text, "all settled here");
    assert_eq!(record.relative_end_ms, 1500);
    assert_eq!(record.meeting_id, meeting_id);
    assert_eq!(h.stage.staged_count(UID), 0);
}

#[tokio::test]
async fn closed_session_flushes_immediately_and_tears_down() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    h.sink.close_session(UID, Utc::now());
    stage_segment(&h, 0, 900, "last words spoken").await;

    h.reconciler.tick(Utc::now()).await.unwrap();

    assert_eq!(h.sink.records().len(), 1);
    assert_eq!(h.stage.staged_count(UID), 0);
    assert!(h.stage.active_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_informative_segments_are_evicted_without_persisting() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    stage_segment(&h, 0, 500, "[BLANK_AUDIO]").await;
    stage_segment(&h, 1000, 1500, "a real sentence though").await;

    h.reconciler.tick(settled()).await.unwrap();

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].relative_start_ms, 1000);
    assert_eq!(h.stage.staged_count(UID), 0);
}

#[tokio::test]
async fn commit_failure_keeps_staging_and_replays_next_tick() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    stage_segment(&h, 0, 1500, "hold on to this one").await;

    h.sink.fail_next_commit();
    h.reconciler.tick(settled()).await.unwrap();
    assert!(h.sink.records().is_empty());
    assert_eq!(h.stage.staged_count(UID), 1);

    h.reconciler.tick(settled()).await.unwrap();
    assert_eq!(h.sink.records().len(), 1);
    assert_eq!(h.stage.staged_count(UID), 0);
}

#[tokio::test]
async fn committed_rows_carry_speaker_attribution() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    stage_speaker(&h, "Ada", SpeakerEventKind::Start, 0).await;
    stage_speaker(&h, "Ada", SpeakerEventKind::End, 5000).await;
    stage_speaker(&h, "Bo", SpeakerEventKind::Start, 4000).await;
    stage_speaker(&h, "Bo", SpeakerEventKind::End, 9000).await;
    stage_segment(&h, 1000, 2000, "only ada talking now").await;
    stage_segment(&h, 4200, 4800, "both of them at once").await;
    stage_segment(&h, 9500, 10000, "nobody on the record").await;

    h.reconciler.tick(settled()).await.unwrap();

    let solo = h.sink.record(UID, 1000).unwrap();
    assert_eq!(solo.speaker_status, SpeakerStatus::Mapped);
    assert_eq!(solo.speaker_name.as_deref(), Some("Ada"));

    let overlap = h.sink.record(UID, 4200).unwrap();
    assert_eq!(overlap.speaker_status, SpeakerStatus::Multiple);
    assert_eq!(overlap.speaker_name, None);

    let silence = h.sink.record(UID, 9500).unwrap();
    assert_eq!(silence.speaker_status, SpeakerStatus::Unknown);
    assert_eq!(silence.speaker_name, None);
}

#[tokio::test]
async fn correlation_failure_still_persists_the_segment() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    // An open START later than any observed activity cannot form an interval.
    stage_speaker(&h, "Ada", SpeakerEventKind::Start, 50_000).await;
    stage_segment(&h, 0, 1200, "words worth keeping").await;

    h.reconciler.tick(settled()).await.unwrap();

    let record = h.sink.record(UID, 0).unwrap();
    assert_eq!(record.speaker_status, SpeakerStatus::Error);
    assert_eq!(record.speaker_name, None);
}

#[tokio::test]
async fn sessions_unknown_to_durable_storage_are_left_alone() {
    let h = harness();
    stage_segment(&h, 0, 1000, "orphaned for now").await;

    h.reconciler.tick(settled()).await.unwrap();

    assert!(h.sink.records().is_empty());
    assert_eq!(h.stage.staged_count(UID), 1);
    assert_eq!(h.stage.active_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn idle_open_session_is_closed_implicitly_after_grace() {
    let h = harness();
    h.sink.open_session(UID, Utc::now() - Duration::seconds(1000));
    let last_write = Utc::now() - Duration::seconds(400);
    h.stage.set_last_write(UID, last_write.timestamp_millis());

    h.reconciler.tick(Utc::now()).await.unwrap();

    let closes = h.sink.idle_closes();
    assert_eq!(closes.len(), 1);
    // Grace default is 300s; the implicit end pins to last write plus grace.
    let expected = last_write.timestamp_millis() + 300_000;
    assert_eq!(closes[0].1.timestamp_millis(), expected);
    assert!(h.stage.active_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn drained_open_session_within_grace_stays_active() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    h.stage
        .set_last_write(UID, Utc::now().timestamp_millis());

    h.reconciler.tick(Utc::now()).await.unwrap();

    assert!(h.sink.idle_closes().is_empty());
    assert_eq!(h.stage.active_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn replayed_batches_do_not_duplicate_rows() {
    let h = harness();
    h.sink.open_session(UID, Utc::now());
    stage_segment(&h, 0, 1500, "say it exactly once").await;
    h.reconciler.tick(settled()).await.unwrap();

    // The same interval staged and settled again, as after a crash replay.
    stage_segment(&h, 0, 1500, "say it exactly once").await;
    h.reconciler.tick(settled()).await.unwrap();

    assert_eq!(h.sink.records().len(), 1);
}
