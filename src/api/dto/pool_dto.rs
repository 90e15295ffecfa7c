//! Pool-related DTOs for list, create and detail responses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// One entry of the `GET /pools` list.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolNameDto {
    /// Pool name.
    pub name: String,
}

/// Response body for `GET /pools`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolListResponse {
    /// Registered pools.
    pub pools: Vec<PoolNameDto>,
}

/// Pool descriptor returned by `PUT /pool/{name}` and `GET /pool/{name}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PoolDto {
    /// Pool name.
    pub name: String,
    /// Number of registered sessions.
    pub sessions: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
