use std::fmt;
use std::str::FromStr;

use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A logical meeting on an external platform. May span multiple capture
/// sessions across reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub account_id: ObjectId,
    pub platform: Platform,
    /// The platform-native meeting identifier (e.g. a Google Meet code).
    pub external_id: String,
    #[serde(default)]
    pub status: MeetingStatus,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleMeet,
    Zoom,
    Teams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    #[default]
    Requested,
    Active,
    Completed,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleMeet => "google_meet",
            Platform::Zoom => "zoom",
            Platform::Teams => "teams",
        }
    }

    /// Constructs the full meeting URL from the platform-native id, when the
    /// id is well-formed enough to do so. Teams URLs cannot be derived from
    /// the bare id and always return `None`.
    pub fn meeting_url(&self, external_id: &str) -> Option<String> {
        match self {
            Platform::GoogleMeet => {
                if is_meet_code(external_id) {
                    Some(format!("https://meet.google.com/{external_id}"))
                } else {
                    None
                }
            }
            Platform::Zoom => {
                let (id, pwd) = match external_id.split_once("?pwd=") {
                    Some((id, pwd)) => (id, Some(pwd)),
                    None => (external_id, None),
                };
                if !(9..=11).contains(&id.len()) || !id.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                match pwd {
                    Some(pwd) if !pwd.is_empty() => {
                        Some(format!("https://zoom.us/j/{id}?pwd={pwd}"))
                    }
                    Some(_) => None,
                    None => Some(format!("https://zoom.us/j/{id}")),
                }
            }
            Platform::Teams => None,
        }
    }
}

/// Google Meet codes look like `xxx-xxxx-xxx` (lowercase letters).
fn is_meet_code(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    parts.len() == 3
        && parts[0].len() == 3
        && parts[1].len() == 4
        && parts[2].len() == 3
        && parts
            .iter()
            .all(|p| p.bytes().all(|b| b.is_ascii_lowercase()))
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_meet" => Ok(Platform::GoogleMeet),
            "zoom" => Ok(Platform::Zoom),
            "teams" => Ok(Platform::Teams),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl Meeting {
    pub const COLLECTION: &'static str = "meetings";
}
