use crate::auth::mw_require_auth;
use crate::config::AppState;
use crate::handlers;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/conversations/{conversation_id}/messages",
            post(handlers::send_message).get(handlers::list_messages),
        )
        .route(
            "/api/conversations/{conversation_id}/join",
            post(handlers::join),
        )
        .route(
            "/api/conversations/{conversation_id}/leave",
            post(handlers::leave),
        )
        .route("/api/messages/{message_id}/read", post(handlers::mark_read))
        .route("/api/messages/{message_id}", delete(handlers::delete_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth));

    Router::new()
        // Polling transport
        .route("/api/realtime/poll", get(handlers::poll))
        .route("/api/realtime/connect", post(handlers::connect))
        .route("/api/realtime/disconnect", post(handlers::disconnect))
        .route("/api/realtime/ping", post(handlers::ping))
        .route("/health", get(handlers::health_check))
        .merge(protected)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
