use crate::{handlers::AppState, models::Stats};
use axum::{extract::State, Json};

pub async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    let (orders_matched, orders_expired, notify_success, notify_failed) =
        state.analytics.counters();

    Json(Stats {
        scanners: state.analytics.scanner_snapshots(),
        rates: state.rates.snapshots().await,
        orders_matched,
        orders_expired,
        notify_success,
        notify_failed,
    })
}
