use crate::{handlers::AppState, models::HealthStatus};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let redis_ok = state.cache.ping().await.unwrap_or(false);
    let scanners = state.analytics.scanner_count();

    let status = if scanners == 0 {
        "unhealthy"
    } else if state.cache.has_redis() && !redis_ok {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        scanners,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
