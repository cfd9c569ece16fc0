use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Failure taxonomy for the messaging core. Push failures are deliberately
/// absent: delivery notification is best-effort and never surfaces.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("conversation not found")]
    NotFound,

    #[error("attachment upload failed: {0}")]
    Attachment(anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound => StatusCode::NOT_FOUND,
            ChatError::Attachment(_) => StatusCode::BAD_GATEWAY,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            ChatError::Attachment(source) => error!("attachment upload failed: {:#}", source),
            ChatError::Storage(source) => error!("storage failure: {:#}", source),
            _ => {}
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> ChatError {
    ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e))
}
