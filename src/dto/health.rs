use serde::Serialize;
use utoipa::ToSchema;

/// Overall service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Store reachable.
    Ok,
    /// No usable session store; mutating routes answer 503.
    Degraded,
}

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall state.
    pub status: HealthStatus,
    /// Last storage failure observed by the health check, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_error: Option<String>,
}

impl HealthResponse {
    /// Healthy response.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            storage_error: None,
        }
    }

    /// Degraded response carrying the last storage error.
    pub fn degraded(storage_error: Option<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            storage_error,
        }
    }
}
