use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::{error::ApiError, extractors::auth::AuthAccount, state::AppState};
use meetscribe_db::models::{Platform, TranscriptSegment};

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub session_uid: String,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Wall clock of the segment start, derived from the session start.
    pub absolute_start: Option<String>,
    pub text: String,
    pub language: Option<String>,
    pub speaker_name: Option<String>,
    pub speaker_status: String,
}

/// Full transcript of the latest meeting for (platform, external id), only
/// ever from durable storage. Segments still sitting in staging are not
/// visible until reconciliation commits them.
pub async fn get(
    State(state): State<AppState>,
    auth: AuthAccount,
    Path((platform, external_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let platform: Platform = platform
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown platform: {platform}")))?;

    let meeting = state
        .meetings
        .latest(auth.account_id, platform, &external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Meeting not found".to_string()))?;
    let meeting_id = meeting
        .id
        .ok_or_else(|| ApiError::Internal("Meeting without id".to_string()))?;

    let sessions = state.sessions.for_meeting(meeting_id).await?;
    let segments = state.transcripts.for_meeting(meeting_id).await?;

    // Session order by start time; segments sort within it by offset.
    let session_index: HashMap<&str, (usize, bson::DateTime)> = sessions
        .iter()
        .enumerate()
        .map(|(i, s)| (s.session_uid.as_str(), (i, s.started_at)))
        .collect();

    let mut ordered: Vec<&TranscriptSegment> = segments.iter().collect();
    ordered.sort_by_key(|s| {
        let order = session_index
            .get(s.session_uid.as_str())
            .map(|(i, _)| *i)
            .unwrap_or(usize::MAX);
        (order, s.relative_start_ms)
    });

    let items: Vec<SegmentResponse> = ordered
        .into_iter()
        .map(|s| {
            let absolute_start = session_index.get(s.session_uid.as_str()).and_then(
                |(_, started_at)| {
                    bson::DateTime::from_millis(
                        started_at.timestamp_millis() + s.relative_start_ms,
                    )
                    .try_to_rfc3339_string()
                    .ok()
                },
            );
            SegmentResponse {
                session_uid: s.session_uid.clone(),
                start_ms: s.relative_start_ms,
                end_ms: s.relative_end_ms,
                absolute_start,
                text: s.text.clone(),
                language: s.language.clone(),
                speaker_name: s.speaker_name.clone(),
                speaker_status: format!("{:?}", s.speaker_status).to_lowercase(),
            }
        })
        .collect();

    Ok(Json(serde_json::json!({
        "meeting_id": meeting_id.to_hex(),
        "platform": meeting.platform.to_string(),
        "external_id": meeting.external_id,
        "meeting_url": meeting.platform.meeting_url(&meeting.external_id),
        "status": format!("{:?}", meeting.status).to_lowercase(),
        "sessions": sessions.iter().map(|s| serde_json::json!({
            "session_uid": s.session_uid,
            "started_at": s.started_at.try_to_rfc3339_string().unwrap_or_default(),
            "ended_at": s.ended_at.and_then(|d| d.try_to_rfc3339_string().ok()),
            "status": format!("{:?}", s.status).to_lowercase(),
        })).collect::<Vec<_>>(),
        "segments": items,
    })))
}
