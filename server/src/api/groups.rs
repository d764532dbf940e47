use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{required, ApiError, ApiResult, LimitQuery};
use crate::chat::broadcast::send_to_many;
use crate::db::models::NewGroup;
use crate::gateway::{Order, ScopeFilter};
use crate::state::AppState;
use crate::ws::protocol::{GroupView, MessageView, ServerEvent};

const NAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=50;

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: Option<String>,
    pub creator: Option<String>,
    pub members: Option<Vec<String>>,
}

impl CreateGroup {
    fn validate(self) -> ApiResult<NewGroup> {
        let invalid = || ApiError::BadRequest("Invalid group chat data".to_string());

        let name = required(self.name).ok_or_else(invalid)?;
        let creator = required(self.creator).ok_or_else(invalid)?;
        let members = self.members.ok_or_else(invalid)?;

        if !NAME_LENGTH.contains(&name.chars().count()) {
            return Err(ApiError::BadRequest(
                "Group name must be between 3 and 50 characters".to_string(),
            ));
        }

        let members = members
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Ok(NewGroup {
            name,
            creator,
            members,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupsQuery {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberBody {
    pub username: Option<String>,
}

/// POST /api/groups
/// Members already connected are told about the new group right away. Their
/// open connections do not join its room until they log in again.
pub async fn create_group(
    State(state): State<AppState>,
    Json(body): Json<CreateGroup>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let new_group = body.validate()?;
    let group = state.gateway.create_group(new_group).await?;

    let online: Vec<_> = group
        .members
        .iter()
        .filter_map(|member| state.presence.resolve(member))
        .collect();
    let view = GroupView::from(group);
    let notified = send_to_many(
        &state.connections,
        &online,
        &ServerEvent::GroupChatCreated(view.clone()),
    );

    tracing::info!(
        group_id = %view.id,
        name = %view.name,
        members = view.members.len(),
        notified,
        "Group created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "group": view })),
    ))
}

/// GET /api/groups?username=
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<GroupsQuery>,
) -> ApiResult<Json<Value>> {
    let username = required(query.username)
        .ok_or_else(|| ApiError::BadRequest("Username is required".to_string()))?;

    let groups: Vec<GroupView> = state
        .gateway
        .groups_for_user(&username)
        .await?
        .into_iter()
        .map(GroupView::from)
        .collect();

    Ok(Json(json!({ "success": true, "groups": groups })))
}

/// GET /api/groups/{group_id}/messages?limit=
pub async fn group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let messages: Vec<MessageView> = state
        .gateway
        .query_messages(
            ScopeFilter::Group { group_id },
            query.limit(),
            Order::OldestFirst,
        )
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect();

    Ok(Json(json!({ "success": true, "messages": messages })))
}

/// POST /api/groups/{group_id}/members
pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(body): Json<MemberBody>,
) -> ApiResult<Json<Value>> {
    let username = required(body.username)
        .ok_or_else(|| ApiError::BadRequest("Username is required".to_string()))?;

    let group = state.gateway.add_member(&group_id, &username).await?;
    tracing::info!(group_id = %group.id, username = %username, "Member added");

    Ok(Json(json!({
        "success": true,
        "message": "Member added successfully",
        "group": GroupView::from(group),
    })))
}

/// DELETE /api/groups/{group_id}/members/{username}
pub async fn remove_member(
    State(state): State<AppState>,
    Path((group_id, username)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let group = state.gateway.remove_member(&group_id, &username).await?;
    tracing::info!(group_id = %group.id, username = %username, "Member removed");

    Ok(Json(json!({
        "success": true,
        "message": "Member removed successfully",
        "group": GroupView::from(group),
    })))
}
