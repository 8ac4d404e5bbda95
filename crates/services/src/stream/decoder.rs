use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::stage::SpeakerEventKind;

/// The inbound event envelope. One JSON object per log entry, discriminated
/// by `type`. Deserialization failure (bad JSON, unknown type, missing
/// required fields) means the payload is malformed and must be acked and
/// dropped rather than retried.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    SessionStart {
        #[serde(flatten)]
        scope: EventScope,
        start_timestamp: String,
    },
    Transcription {
        #[serde(flatten)]
        scope: EventScope,
        segments: Vec<WireSegment>,
    },
    SessionEnd {
        #[serde(flatten)]
        scope: EventScope,
        end_timestamp: Option<String>,
    },
    SpeakerActivity {
        #[serde(flatten)]
        scope: EventScope,
        event_type: WireSpeakerEvent,
        participant_name: String,
        participant_id: Option<String>,
        relative_timestamp_ms: f64,
    },
}

/// Fields common to every envelope type: who sent it, for which platform
/// meeting, under which capture session.
#[derive(Debug, Deserialize)]
pub struct EventScope {
    pub uid: String,
    pub token: String,
    pub platform: String,
    pub meeting_id: String,
}

/// One transcript interval as emitted by the speech engine: float seconds
/// relative to the session audio start. Individual segments missing their
/// interval are skipped without failing the whole envelope.
#[derive(Debug, Deserialize)]
pub struct WireSegment {
    pub start: Option<f64>,
    pub end: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum WireSpeakerEvent {
    #[serde(rename = "SPEAKER_START")]
    Start,
    #[serde(rename = "SPEAKER_END")]
    End,
}

impl From<WireSpeakerEvent> for SpeakerEventKind {
    fn from(event: WireSpeakerEvent) -> Self {
        match event {
            WireSpeakerEvent::Start => SpeakerEventKind::Start,
            WireSpeakerEvent::End => SpeakerEventKind::End,
        }
    }
}

pub fn decode(payload: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Wire timestamps are RFC 3339 ("Z" suffix included).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Segment times arrive as float seconds; everything downstream runs on
/// integral relative milliseconds.
pub fn secs_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}
