use anyhow::Context;
use axum::{Extension, Json, extract::State};
use tracing::warn;
use uuid::Uuid;

use murmur_types::api::{Claims, ConversationSummary, Counterpart};
use murmur_types::models::{LastMessage, Profile};

use crate::error::{ChatError, join_error};
use crate::state::AppState;

/// GET /dm/conversations: the caller's conversations, newest activity
/// first, each decorated with the counterpart's public profile. The caller
/// never appears in their own listing.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ChatError> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.conversations_for_user(&me))
        .await
        .map_err(join_error)??;

    let me = claims.sub.to_string();
    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let counterpart_raw = if row.user_lo == me {
            &row.user_hi
        } else {
            &row.user_lo
        };
        let counterpart_id: Uuid = counterpart_raw
            .parse()
            .context("corrupt participant id")?;

        // Decoration tolerates a missing or unreachable profile; the
        // conversation itself is still listed.
        let profile = match state.profiles.profile(counterpart_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => Profile::default(),
            Err(e) => {
                warn!("profile lookup failed for {}: {:#}", counterpart_id, e);
                Profile::default()
            }
        };

        summaries.push(ConversationSummary {
            id: row.id.parse().context("corrupt conversation id")?,
            counterpart: Counterpart {
                user_id: counterpart_id,
                profile,
            },
            last_message: LastMessage {
                text: row.last_message_text,
                sender: row
                    .last_message_sender
                    .parse()
                    .context("corrupt summary sender")?,
            },
            updated_at: row
                .updated_at
                .parse()
                .context("corrupt conversation timestamp")?,
        });
    }

    Ok(Json(summaries))
}
