//! Health check endpoint

use axum::extract::State;
use hlsgate_livestream::HealthSummary;

use crate::http::{ApiResponse, AppState};

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthSummary> {
    ApiResponse::ok("Streaming service is running", state.manager.health())
}
