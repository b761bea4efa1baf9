use crate::models::{Asset, Network};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub redis: bool,
    pub scanners: usize,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Uninitialized,
    Backfilling,
    Steady,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScannerSnapshot {
    pub network: Network,
    pub state: ScanState,
    pub cursor: Option<u64>,
    pub units_total: u64,
    pub units_failed: u64,
    pub success_rate: f64,
    pub backlog: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateSnapshot {
    pub asset: Asset,
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Stats {
    pub scanners: Vec<ScannerSnapshot>,
    pub rates: Vec<RateSnapshot>,
    pub orders_matched: u64,
    pub orders_expired: u64,
    pub notify_success: u64,
    pub notify_failed: u64,
}
