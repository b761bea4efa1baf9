use crate::models::{Network, ScanState, ScannerSnapshot};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Live counters of one scanner instance. Written by the scanner, read by `/stats`.
pub struct ScannerStatus {
    network: Network,
    state: AtomicU8,
    cursor: AtomicI64,
    units_total: AtomicU64,
    units_failed: AtomicU64,
    backlog: AtomicI64,
}

impl ScannerStatus {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: AtomicU8::new(0),
            cursor: AtomicI64::new(-1),
            units_total: AtomicU64::new(0),
            units_failed: AtomicU64::new(0),
            backlog: AtomicI64::new(0),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn set_state(&self, state: ScanState) {
        let raw = match state {
            ScanState::Uninitialized => 0,
            ScanState::Backfilling => 1,
            ScanState::Steady => 2,
        };
        self.state.store(raw, Ordering::SeqCst);
    }

    pub fn state(&self) -> ScanState {
        match self.state.load(Ordering::SeqCst) {
            0 => ScanState::Uninitialized,
            1 => ScanState::Backfilling,
            _ => ScanState::Steady,
        }
    }

    pub fn set_cursor(&self, cursor: u64) {
        self.cursor
            .store(i64::try_from(cursor).unwrap_or(i64::MAX), Ordering::SeqCst);
    }

    pub fn enqueued(&self, n: u64) {
        self.backlog.fetch_add(n as i64, Ordering::SeqCst);
    }

    pub fn dequeued(&self) {
        self.backlog.fetch_sub(1, Ordering::SeqCst);
    }

    /// Records one attempted unit; returns the running success rate in percent.
    pub fn record_unit(&self, ok: bool) -> f64 {
        self.units_total.fetch_add(1, Ordering::SeqCst);
        if !ok {
            self.units_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.success_rate()
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.units_total.load(Ordering::SeqCst);
        if total == 0 {
            return 100.0;
        }
        let failed = self.units_failed.load(Ordering::SeqCst);
        (total - failed) as f64 / total as f64 * 100.0
    }

    pub fn snapshot(&self) -> ScannerSnapshot {
        let cursor = self.cursor.load(Ordering::SeqCst);
        ScannerSnapshot {
            network: self.network,
            state: self.state(),
            cursor: u64::try_from(cursor).ok(),
            units_total: self.units_total.load(Ordering::SeqCst),
            units_failed: self.units_failed.load(Ordering::SeqCst),
            success_rate: self.success_rate(),
            backlog: self.backlog.load(Ordering::SeqCst).max(0) as u64,
        }
    }
}

/// Process-wide engine counters.
pub struct Analytics {
    scanners: RwLock<Vec<Arc<ScannerStatus>>>,
    orders_matched: AtomicU64,
    orders_expired: AtomicU64,
    notify_success: AtomicU64,
    notify_failed: AtomicU64,
    start_time: Instant,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    pub fn new() -> Self {
        Self {
            scanners: RwLock::new(Vec::new()),
            orders_matched: AtomicU64::new(0),
            orders_expired: AtomicU64::new(0),
            notify_success: AtomicU64::new(0),
            notify_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn register_scanner(&self, network: Network) -> Arc<ScannerStatus> {
        let status = Arc::new(ScannerStatus::new(network));
        if let Ok(mut scanners) = self.scanners.write() {
            scanners.push(status.clone());
        }
        status
    }

    pub fn scanner_snapshots(&self) -> Vec<ScannerSnapshot> {
        self.scanners
            .read()
            .map(|s| s.iter().map(|status| status.snapshot()).collect())
            .unwrap_or_default()
    }

    pub fn scanner_count(&self) -> usize {
        self.scanners.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn order_matched(&self) {
        self.orders_matched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn order_expired(&self) {
        self.orders_expired.fetch_add(1, Ordering::SeqCst);
    }

    pub fn notify_result(&self, ok: bool) {
        if ok {
            self.notify_success.fetch_add(1, Ordering::SeqCst);
        } else {
            self.notify_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (
            self.orders_matched.load(Ordering::SeqCst),
            self.orders_expired.load(Ordering::SeqCst),
            self.notify_success.load(Ordering::SeqCst),
            self.notify_failed.load(Ordering::SeqCst),
        )
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
