use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use crate::core::ComponentHealth;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks connectivity to the database and the dispatch queue.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (database, queue) = tokio::join!(state.health_service.check_db(), state.health_service.check_queue());

    let mut status_code = StatusCode::OK;
    for (component, health) in [("database", &database), ("queue", &queue)] {
        if let ComponentHealth::Error(e) = health {
            tracing::warn!(error = %e, component, "Readiness probe failed");
            status_code = StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database: database.as_str().to_string(),
        queue: queue.as_str().to_string(),
    };

    (status_code, Json(response))
}
