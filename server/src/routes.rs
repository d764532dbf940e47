use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::{groups, messages, users};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login));

    let group_routes = Router::new()
        .route("/api/groups", get(groups::list_groups))
        .route("/api/groups", post(groups::create_group))
        .route("/api/groups/{group_id}/messages", get(groups::group_messages))
        .route("/api/groups/{group_id}/members", post(groups::add_member))
        .route(
            "/api/groups/{group_id}/members/{username}",
            delete(groups::remove_member),
        );

    let message_routes = Router::new()
        .route("/api/messages/global", get(messages::global_messages))
        .route("/api/messages/private", get(messages::private_messages))
        .route("/api/messages/read", put(messages::mark_read));

    // WebSocket endpoint; identity arrives in the first `userLogin` event
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(user_routes)
        .merge(group_routes)
        .merge(message_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
