pub mod health;
pub mod stats;

pub use health::*;
pub use stats::*;

use crate::services::{Analytics, CacheService, RateOracle};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheService>,
    pub analytics: Arc<Analytics>,
    pub rates: Arc<RateOracle>,
}

/// Read-only status surface: `/health` and `/stats`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateConfig;
    use crate::models::{Network, ScanState};
    use axum::{extract::State, Json};
    use std::time::Duration;

    fn state() -> AppState {
        let rates = RateConfig {
            api_url: "http://127.0.0.1:1".into(),
            interval: Duration::from_secs(1800),
            usdt: "7.1".into(),
            usdc: String::new(),
            trx: String::new(),
        };
        AppState {
            cache: Arc::new(CacheService::memory_only(Duration::from_secs(60))),
            analytics: Arc::new(Analytics::new()),
            rates: Arc::new(RateOracle::new(reqwest::Client::new(), &rates)),
        }
    }

    #[tokio::test]
    async fn health_needs_a_running_scanner() {
        let state = state();
        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.status, "unhealthy");

        state.analytics.register_scanner(Network::Solana);
        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.scanners, 1);
        assert!(!health.redis);
    }

    #[tokio::test]
    async fn stats_report_scanners_rates_and_counters() {
        let state = state();
        let status = state.analytics.register_scanner(Network::Ethereum);
        status.set_state(ScanState::Backfilling);
        status.enqueued(3);
        state.analytics.order_matched();
        state.analytics.notify_result(false);

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.scanners.len(), 1);
        assert_eq!(stats.scanners[0].backlog, 3);
        assert_eq!(stats.scanners[0].state, ScanState::Backfilling);
        assert_eq!(stats.rates.len(), 3);
        assert_eq!(stats.orders_matched, 1);
        assert_eq!(stats.notify_failed, 1);
    }
}
