//! Plain-text health surface for the daemon.

use axum::{extract::State, http::StatusCode, routing::get, Router};

use archiva_scheduler::SchedulerHandle;

pub fn build_router(scheduler: SchedulerHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(scheduler)
}

/// One line per task plus the running-set summary, as reported by the
/// scheduler's control loop.
async fn healthz(State(scheduler): State<SchedulerHandle>) -> (StatusCode, String) {
    match scheduler.health_check().await {
        Ok(report) => (StatusCode::OK, report.to_string()),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("scheduler unavailable: {e}\n"),
        ),
    }
}
