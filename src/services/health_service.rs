use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the session store and report whether the service runs degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let check = match state.require_session_store().await {
        Ok(store) => store.health_check().await.map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
    };

    match check {
        Ok(()) if !state.is_degraded().await => HealthResponse::ok(),
        Ok(()) => HealthResponse::degraded(None),
        Err(message) => {
            warn!(error = %message, "session store health check failed");
            HealthResponse::degraded(Some(message))
        }
    }
}
