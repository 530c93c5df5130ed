use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` when the match store answers, `degraded` otherwise.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => HealthResponse::ok(),
            Err(err) => {
                warn!(error = %err, "match store health check failed");
                HealthResponse::degraded()
            }
        },
        Err(_) => {
            warn!("match store unavailable (degraded mode)");
            HealthResponse::degraded()
        }
    }
}
