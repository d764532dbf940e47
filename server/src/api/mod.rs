//! Request/response surface over the gateway: accounts, groups and paged history.
//! None of this touches the real-time core except group creation, which
//! notifies members that are currently online.

pub mod error;
pub mod groups;
pub mod messages;
pub mod users;

pub use error::{ApiError, ApiResult};

use serde::Deserialize;

/// Default page size for history endpoints
pub const DEFAULT_LIMIT: usize = 50;

/// Largest page a history endpoint will return
pub const MAX_LIMIT: usize = 500;

/// `?limit=` on history endpoints
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Treat blank strings as missing
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
