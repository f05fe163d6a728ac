use super::conversations::members_for;
use super::require_safe_id;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use courier_common::{Message, ReadReceipt};
use tracing::info;

async fn find_message(state: &AppState, message_id: &str) -> Result<Message> {
    require_safe_id("message", message_id)?;
    state
        .store
        .get_message(message_id)
        .await?
        .ok_or_else(|| Error::MessageNotFound {
            id: message_id.to_string(),
        })
}

/// POST /api/messages/{message_id}/read
pub async fn mark_read(
    Path(message_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    let message = find_message(&state, &message_id).await?;
    let members = members_for(&state, &message.conversation_id, &ctx).await?;

    state.store.mark_read(&message_id, ctx.user_id()).await?;

    let receipt = ReadReceipt {
        message_id,
        conversation_id: message.conversation_id,
        reader_id: ctx.user_id().to_string(),
        read_at: Utc::now(),
    };
    state.realtime.publish_read(&members, &receipt);

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/messages/{message_id}
///
/// Soft delete; only the sender may remove a message.
pub async fn delete_message(
    Path(message_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    let message = find_message(&state, &message_id).await?;
    if message.sender_id != ctx.user_id() {
        return Err(Error::Forbidden("Only the sender can delete a message".into()));
    }

    state.store.soft_delete(&message_id).await?;
    info!("Message {} deleted by {}", message_id, ctx.user_id());

    Ok(StatusCode::NO_CONTENT)
}
