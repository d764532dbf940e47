use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input
    #[error("{0}")]
    BadRequest(String),
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Server error")]
    Internal(String),
}

impl ApiError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::warn!(error = %detail, "Request failed");
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (self.as_status_code(), body).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::NotFound {
                resource: "group member",
                ..
            } => Self::BadRequest("User is not a member of this group".to_string()),
            GatewayError::Conflict {
                resource: "group member",
                ..
            } => Self::BadRequest("User is already a member".to_string()),
            GatewayError::NotFound { resource, .. } => Self::NotFound(resource),
            GatewayError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_errors_are_bad_requests() {
        let err = ApiError::from(GatewayError::NotFound {
            resource: "group member",
            identifier: "bob".to_string(),
        });
        assert_eq!(err.as_status_code(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(GatewayError::NotFound {
            resource: "group",
            identifier: "g1".to_string(),
        });
        assert_eq!(err.as_status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "group not found");
    }

    #[test]
    fn timeouts_hide_details() {
        let err = ApiError::from(GatewayError::Timeout);
        assert_eq!(err.as_status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Server error");
    }
}
