use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{required, ApiError, ApiResult};
use crate::db::models::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    fn validate(self) -> ApiResult<(String, String)> {
        let username = required(self.username);
        // Passwords are taken verbatim, only emptiness is rejected
        let password = self.password.filter(|p| !p.is_empty());

        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(ApiError::BadRequest(
                "Username and password are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub is_online: bool,
    pub last_active: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            is_online: user.is_online,
            last_active: user.last_active,
        }
    }
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// POST /api/users/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (username, password) = body.validate()?;

    if state.gateway.find_user(&username).await?.is_some() {
        return Err(ApiError::Conflict {
            resource: "user",
            field: "username",
            value: username,
        });
    }

    // Argon2 runs on the blocking pool
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let user = state.gateway.create_user(&username, &hash).await?;
    tracing::info!(username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User registered successfully",
            "username": user.username,
        })),
    ))
}

/// POST /api/users/login
/// Checks credentials and stamps the persisted online flag. Live presence
/// only starts once the client's socket sends `userLogin`.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> ApiResult<Json<Value>> {
    let (username, password) = body.validate()?;

    let stored = state
        .gateway
        .password_hash(&username)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    state.gateway.set_online(&username, true).await?;

    Ok(Json(json!({
        "success": true,
        "username": username,
    })))
}

/// GET /api/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let users: Vec<UserSummary> = state
        .gateway
        .list_users()
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect();

    Ok(Json(json!({ "success": true, "users": users })))
}
