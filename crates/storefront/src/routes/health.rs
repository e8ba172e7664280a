//! Health check endpoints.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.stores().orders.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::{TestApp, empty_request};

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = TestApp::new();

        let response = app.send(empty_request("GET", "/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(empty_request("GET", "/health/ready")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
