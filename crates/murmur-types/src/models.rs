use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized summary of the latest message in a conversation, kept on
/// the conversation itself so the list view never scans message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub text: String,
    pub sender: Uuid,
}

/// Immutable unit of content scoped to one conversation.
/// `text` may be empty only when an attachment is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public profile fields served by the user service. Identities are owned
/// there; this backend only references them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub profile_pic: String,
}
