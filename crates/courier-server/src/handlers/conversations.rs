use crate::config::AppState;
use crate::ctx::Ctx;
use super::require_safe_id;
use crate::error::{Error, Result};
use crate::store::NewMessage;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use courier_common::{MembershipChange, Message, SendMessageRequest};
use tracing::info;

/// Members of `conversation_id`, requiring the caller to be one of them.
pub(crate) async fn members_for(
    state: &AppState,
    conversation_id: &str,
    ctx: &Ctx,
) -> Result<Vec<String>> {
    let members = state
        .store
        .members(conversation_id)
        .await?
        .ok_or_else(|| Error::ConversationNotFound {
            id: conversation_id.to_string(),
        })?;

    if !members.iter().any(|m| m == ctx.user_id()) {
        return Err(Error::Forbidden(format!(
            "{} is not a member of {}",
            ctx.user_id(),
            conversation_id
        )));
    }
    Ok(members)
}

/// POST /api/conversations/{conversation_id}/messages
///
/// Persists the message, then enqueues `message:new` for every other member.
pub async fn send_message(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
    Json(input): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    require_safe_id("conversation", &conversation_id)?;
    info!("POST /api/conversations/{}/messages", conversation_id);

    let attachments = input.attachments.unwrap_or_default();
    if input.content.trim().is_empty() && attachments.is_empty() {
        return Err(Error::BadRequest("Message content is empty".into()));
    }

    let members = members_for(&state, &conversation_id, &ctx).await?;

    let message = state
        .store
        .append_message(
            &conversation_id,
            ctx.identity(),
            NewMessage {
                content: input.content,
                attachments,
                client_id: input.client_id,
            },
        )
        .await?;

    let delivered = state.realtime.publish_message(&members, &message);
    info!(
        "Message {} in {} delivered to {} mailbox(es)",
        message.id, conversation_id, delivered
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/conversations/{conversation_id}/messages
pub async fn list_messages(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<Message>>> {
    require_safe_id("conversation", &conversation_id)?;
    members_for(&state, &conversation_id, &ctx).await?;
    let messages = state
        .store
        .list_messages(&conversation_id)
        .await?
        .unwrap_or_default();
    Ok(Json(messages))
}

/// POST /api/conversations/{conversation_id}/join
///
/// Creates the conversation on first join.
pub async fn join(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    require_safe_id("conversation", &conversation_id)?;
    info!("POST /api/conversations/{}/join by {}", conversation_id, ctx.user_id());

    if state.store.add_member(&conversation_id, ctx.user_id()).await? {
        let members = state
            .store
            .members(&conversation_id)
            .await?
            .unwrap_or_default();
        let change = MembershipChange {
            conversation_id,
            user_id: ctx.user_id().to_string(),
        };
        state.realtime.publish_membership(&members, &change, true);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/conversations/{conversation_id}/leave
pub async fn leave(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    require_safe_id("conversation", &conversation_id)?;
    info!("POST /api/conversations/{}/leave by {}", conversation_id, ctx.user_id());

    if state.store.members(&conversation_id).await?.is_none() {
        return Err(Error::ConversationNotFound { id: conversation_id });
    }

    if state.store.remove_member(&conversation_id, ctx.user_id()).await? {
        let remaining = state
            .store
            .members(&conversation_id)
            .await?
            .unwrap_or_default();
        let change = MembershipChange {
            conversation_id,
            user_id: ctx.user_id().to_string(),
        };
        state.realtime.publish_membership(&remaining, &change, false);
    }

    Ok(StatusCode::NO_CONTENT)
}
