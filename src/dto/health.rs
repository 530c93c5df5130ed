use serde::Serialize;
use utoipa::ToSchema;

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` while match history is recorded, `degraded` otherwise.
    pub status: &'static str,
}

impl HealthResponse {
    /// Store reachable.
    pub fn ok() -> Self {
        Self { status: "ok" }
    }

    /// Running without a match store.
    pub fn degraded() -> Self {
        Self { status: "degraded" }
    }
}
