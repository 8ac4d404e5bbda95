use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use bson::oid::ObjectId;

use crate::{error::ApiError, state::AppState};

const API_KEY_HEADER: &str = "x-api-key";

/// Extracts the calling account from the `X-API-Key` header. The key is the
/// same token that event envelopes carry, so a caller can only read
/// transcripts of meetings its own bots captured.
#[derive(Debug, Clone)]
pub struct AuthAccount {
    pub account_id: ObjectId,
    pub email: String,
}

impl<S> FromRequestParts<S> for AuthAccount
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-API-Key header".to_string()))?;

        let account = app_state
            .accounts
            .by_token(&token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid API key".to_string()))?;

        let account_id = account
            .id
            .ok_or_else(|| ApiError::Internal("Account without id".to_string()))?;

        Ok(AuthAccount {
            account_id,
            email: account.email,
        })
    }
}

/// Helper trait for extracting AppState from composite state types
pub trait FromRef<T> {
    fn from_ref(input: &T) -> Self;
}

impl FromRef<AppState> for AppState {
    fn from_ref(input: &AppState) -> Self {
        input.clone()
    }
}
