use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime,
}

/// Caller credential carried in event envelopes and in the `X-API-Key`
/// header of the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub token: String,
    pub account_id: ObjectId,
    pub created_at: DateTime,
}

impl Account {
    pub const COLLECTION: &'static str = "accounts";
}

impl ApiToken {
    pub const COLLECTION: &'static str = "api_tokens";
}
