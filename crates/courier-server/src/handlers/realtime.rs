//! Long-poll transport endpoints
//!
//! Polling is identified by the `userId` query parameter, and the request's
//! session token must belong to that user. `allow_anonymous_poll` lifts the
//! token requirement.

use crate::auth::session_token;
use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use courier_common::{ConnectRequest, ConnectResponse, Event, PollQuery, PollResponse, UserRequest};
use tracing::{debug, info};

async fn authorize_user(state: &AppState, headers: &HeaderMap, user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(Error::BadRequest("userId is required".into()));
    }

    let token = match session_token(headers)? {
        Some(token) => token,
        None if state.config.allow_anonymous_poll => return Ok(()),
        None => return Err(Error::AuthFailNoToken),
    };
    let identity = state
        .auth
        .authenticate(&token)
        .await
        .ok_or(Error::AuthFailInvalidToken)?;

    if identity.user_id != user_id {
        return Err(Error::Forbidden(format!(
            "Session belongs to {}, not {}",
            identity.user_id, user_id
        )));
    }
    Ok(())
}

/// GET /api/realtime/poll?userId=..&timeout=..&ack=..
pub async fn poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>> {
    authorize_user(&state, &headers, &query.user_id).await?;

    let budget = state.config.poll_budget(query.timeout);
    debug!("GET /api/realtime/poll user={} budget={:?}", query.user_id, budget);

    let messages = state.realtime.poll(&query.user_id, query.ack, budget).await;
    Ok(Json(PollResponse { messages }))
}

/// POST /api/realtime/connect
pub async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>> {
    authorize_user(&state, &headers, &input.user_id).await?;
    info!("POST /api/realtime/connect user={}", input.user_id);
    Ok(Json(state.realtime.connect(&input.user_id)))
}

/// POST /api/realtime/disconnect
pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<UserRequest>,
) -> Result<StatusCode> {
    authorize_user(&state, &headers, &input.user_id).await?;
    state.realtime.disconnect(&input.user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/realtime/ping
pub async fn ping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<UserRequest>,
) -> Result<Json<Event>> {
    authorize_user(&state, &headers, &input.user_id).await?;
    state.realtime.sessions().touch(&input.user_id);
    Ok(Json(Event::pong(input.user_id)))
}
