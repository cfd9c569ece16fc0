use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use uuid::Uuid;

use murmur_types::api::{Claims, SendMessageRequest};
use murmur_types::models::Message;

use crate::delivery::{OutgoingAttachment, message_from_row};
use crate::error::{ChatError, join_error};
use crate::state::AppState;

/// POST /dm/messages: run the send pipeline as the authenticated sender.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let attachment = match req.attachment {
        Some(upload) => {
            let data = B64
                .decode(&upload.data)
                .map_err(|_| ChatError::InvalidRequest("attachment is not valid base64"))?;
            Some(OutgoingAttachment {
                data: Bytes::from(data),
                content_type: upload.content_type,
            })
        }
        None => None,
    };

    let message = state
        .delivery
        .send(claims.sub, req.recipient_id, req.text, attachment)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /dm/{other_user_id}/messages: full history with the other user,
/// oldest first. 404 when the pair has never talked.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(other_user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ChatError> {
    let db = state.db.clone();
    let (me, other) = (claims.sub.to_string(), other_user_id.to_string());

    let rows = tokio::task::spawn_blocking(move || {
        match db.conversation_between(&me, &other)? {
            Some(conversation) => db.messages_for_conversation(&conversation.id).map(Some),
            None => Ok(None),
        }
    })
    .await
    .map_err(join_error)??
    .ok_or(ChatError::NotFound)?;

    let messages = rows
        .into_iter()
        .map(message_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(messages))
}
