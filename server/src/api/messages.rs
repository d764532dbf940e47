use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{required, ApiError, ApiResult, LimitQuery};
use crate::gateway::{Order, ScopeFilter};
use crate::state::AppState;
use crate::ws::protocol::MessageView;

#[derive(Debug, Deserialize)]
pub struct PrivateQuery {
    pub user1: Option<String>,
    pub user2: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadBody {
    pub username: Option<String>,
    pub other_username: Option<String>,
}

async fn page(state: &AppState, filter: ScopeFilter, limit: usize) -> ApiResult<Json<Value>> {
    let messages: Vec<MessageView> = state
        .gateway
        .query_messages(filter, limit, Order::OldestFirst)
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect();

    Ok(Json(json!({ "success": true, "messages": messages })))
}

/// GET /api/messages/global?limit=
pub async fn global_messages(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    page(&state, ScopeFilter::Global, query.limit()).await
}

/// GET /api/messages/private?user1=&user2=&limit=
pub async fn private_messages(
    State(state): State<AppState>,
    Query(query): Query<PrivateQuery>,
) -> ApiResult<Json<Value>> {
    let limit = LimitQuery { limit: query.limit }.limit();
    let (Some(a), Some(b)) = (required(query.user1), required(query.user2)) else {
        return Err(ApiError::BadRequest("Both usernames are required".to_string()));
    };

    page(&state, ScopeFilter::Private { a, b }, limit).await
}

/// PUT /api/messages/read
/// Marks everything `otherUsername` sent to `username` as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Json(body): Json<MarkReadBody>,
) -> ApiResult<Json<Value>> {
    let (Some(username), Some(other)) = (required(body.username), required(body.other_username))
    else {
        return Err(ApiError::BadRequest("Both usernames are required".to_string()));
    };

    let updated = state.gateway.mark_read(&other, &username).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
