use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of live sessions in the registry.
    pub active_matches: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(active_matches: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_matches,
        }
    }

    /// Create a health response indicating the snapshot store is down and the
    /// coordinator is running on its local fallback.
    pub fn degraded(active_matches: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_matches,
        }
    }
}
