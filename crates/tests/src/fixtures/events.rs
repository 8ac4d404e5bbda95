//! Builders for wire-format event payloads, as a bot would publish them.

pub const TOKEN: &str = "tok-fixture";
pub const PLATFORM: &str = "google_meet";
pub const MEETING: &str = "abc-defg-hij";

pub fn session_start(uid: &str, start_timestamp: &str) -> String {
    serde_json::json!({
        "type": "session_start",
        "uid": uid,
        "token": TOKEN,
        "platform": PLATFORM,
        "meeting_id": MEETING,
        "start_timestamp": start_timestamp,
    })
    .to_string()
}

/// `segments` are (start_secs, end_secs, text) triples.
pub fn transcription(uid: &str, segments: &[(f64, f64, &str)]) -> String {
    let segments: Vec<serde_json::Value> = segments
        .iter()
        .map(|(start, end, text)| {
            serde_json::json!({
                "start": start,
                "end": end,
                "text": text,
                "language": "en",
            })
        })
        .collect();
    serde_json::json!({
        "type": "transcription",
        "uid": uid,
        "token": TOKEN,
        "platform": PLATFORM,
        "meeting_id": MEETING,
        "segments": segments,
    })
    .to_string()
}

pub fn speaker_activity(uid: &str, event_type: &str, name: &str, ts_ms: f64) -> String {
    serde_json::json!({
        "type": "speaker_activity",
        "uid": uid,
        "token": TOKEN,
        "platform": PLATFORM,
        "meeting_id": MEETING,
        "event_type": event_type,
        "participant_name": name,
        "participant_id": null,
        "relative_timestamp_ms": ts_ms,
    })
    .to_string()
}

pub fn session_end(uid: &str, end_timestamp: Option<&str>) -> String {
    serde_json::json!({
        "type": "session_end",
        "uid": uid,
        "token": TOKEN,
        "platform": PLATFORM,
        "meeting_id": MEETING,
        "end_timestamp": end_timestamp,
    })
    .to_string()
}

pub fn with_token(payload: &str, token: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(payload).unwrap();
    value["token"] = serde_json::Value::String(token.to_string());
    value.to_string()
}

pub fn with_meeting(payload: &str, meeting_id: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(payload).unwrap();
    value["meeting_id"] = serde_json::Value::String(meeting_id.to_string());
    value.to_string()
}

pub fn with_platform(payload: &str, platform: &str) -> String {
    let mut value: serde_json::Value = serde_json::from_str(payload).unwrap();
    value["platform"] = serde_json::Value::String(platform.to_string());
    value.to_string()
}
