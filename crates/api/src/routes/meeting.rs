use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;

use crate::{error::ApiError, extractors::auth::AuthAccount, state::AppState};
use meetscribe_db::models::Meeting;
use meetscribe_services::dao::PaginationParams;

#[derive(Debug, Serialize)]
pub struct MeetingResponse {
    pub id: String,
    pub platform: String,
    pub external_id: String,
    /// Reconstructed platform URL, when the external id is well-formed.
    pub meeting_url: Option<String>,
    pub status: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub created_at: String,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthAccount,
    Query(params): Query<PaginationParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .meetings
        .list_for_account(auth.account_id, &params)
        .await?;
    let items: Vec<MeetingResponse> = result.items.into_iter().map(to_response).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

fn to_response(m: Meeting) -> MeetingResponse {
    MeetingResponse {
        id: m.id.map(|id| id.to_hex()).unwrap_or_default(),
        platform: m.platform.to_string(),
        meeting_url: m.platform.meeting_url(&m.external_id),
        external_id: m.external_id,
        status: format!("{:?}", m.status).to_lowercase(),
        started_at: m
            .started_at
            .and_then(|d| d.try_to_rfc3339_string().ok()),
        ended_at: m.ended_at.and_then(|d| d.try_to_rfc3339_string().ok()),
        created_at: m.created_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}
