pub mod admin;
pub mod deposits;
pub mod referrals;
pub mod register;
pub mod transactions;
pub mod withdrawals;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use std::time::Instant;

use crate::AppState;
use crate::error::AppError;

/// Liveness plus a database round trip: reports query latency and pool
/// occupancy, 503 when Postgres is unreachable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => json!({
            "status": "healthy",
            "latency_ms": start.elapsed().as_millis() as u64,
        }),
        Err(err) => json!({
            "status": "unhealthy",
            "error": err.to_string(),
        }),
    };

    let healthy = database["status"] == "healthy";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "database": database,
        "pool": {
            "size": state.db.size(),
            "idle": state.db.num_idle(),
        },
    }));

    (status, body)
}

/// Bearer-token guard for the admin surface. Constant shared token; admin
/// identity travels in the request body where a flow needs it.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.admin_api_token => Ok(()),
        _ => Err(AppError::Unauthorized(
            "missing or invalid admin token".to_string(),
        )),
    }
}
