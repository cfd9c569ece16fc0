use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{LastMessage, Profile};

// -- JWT Claims --

/// Verified-identity claims attached by the auth middleware. The account
/// service issues tokens; this backend only validates them and trusts `sub`.
/// Canonical definition lives here so the REST middleware and the gateway
/// upgrade share one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Send --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub text: String,
    pub attachment: Option<AttachmentUpload>,
}

/// Raw attachment bytes, base64 in transit.
#[derive(Debug, Deserialize)]
pub struct AttachmentUpload {
    pub data: String,
    pub content_type: String,
}

// -- Conversations --

/// One entry in the caller's conversation list: who they are talking to
/// (never the caller themselves) plus the latest-message summary.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub counterpart: Counterpart,
    pub last_message: LastMessage,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Counterpart {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub profile: Profile,
}
