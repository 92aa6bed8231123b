use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the coordinator's health, pinging the external session store when
/// one is installed.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    if let Some(store) = state.store().external().await
        && let Err(err) = store.health_check().await
    {
        warn!(error = %err, "session store health check failed");
    }

    let active_matches = state.registry().session_ids().len();
    if state.store().is_degraded().await {
        HealthResponse::degraded(active_matches)
    } else {
        HealthResponse::ok(active_matches)
    }
}
