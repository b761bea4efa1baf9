use crate::{
    chains::{ChainAdapter, ScanCursor, ScanMode, ScanUnit, TickPlan},
    config::ScanConfig,
    error::{GatewayError, Result},
    models::{Network, ScanState, Transfer},
    services::{monitored_on, Analytics, OrderStore, ScannerStatus},
};
use chrono::Utc;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Drives one chain: a tick loop producing work units into an unbounded queue and a fixed
/// worker pool draining it through the adapter.
pub struct Scanner {
    adapter: Arc<dyn ChainAdapter>,
    store: Arc<dyn OrderStore>,
    status: Arc<ScannerStatus>,
    config: ScanConfig,
    confirmed_mode: bool,
    sink: UnboundedSender<Vec<Transfer>>,
}

impl Scanner {
    pub fn new(
        adapter: Arc<dyn ChainAdapter>,
        store: Arc<dyn OrderStore>,
        analytics: &Analytics,
        config: ScanConfig,
        confirmed_mode: bool,
        sink: UnboundedSender<Vec<Transfer>>,
    ) -> Self {
        let status = analytics.register_scanner(adapter.network());
        Self {
            adapter,
            store,
            status,
            config,
            confirmed_mode,
            sink,
        }
    }

    pub fn network(&self) -> Network {
        self.adapter.network()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let scanner = Arc::new(self);
        tokio::spawn(async move {
            let (queue, units) = mpsc::unbounded_channel();
            let dispatch = tokio::spawn(scanner.clone().dispatch(units, queue.clone(), cancel.clone()));
            scanner.clone().roll(queue, cancel).await;
            if let Err(e) = dispatch.await {
                tracing::error!(network = %scanner.network(), "Dispatch task failed: {}", e);
            }
            tracing::info!(network = %scanner.network(), "Scanner stopped");
        })
    }

    async fn roll(self: Arc<Self>, queue: UnboundedSender<ScanUnit>, cancel: CancellationToken) {
        let mut cursor = ScanCursor::new(self.network().scan_defaults(), self.config.max_gap);
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(network = %self.network(), "Scanner started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(&mut cursor, &queue, &cancel).await,
            }
        }
    }

    /// One producer step. Never waits on the worker pool.
    pub async fn tick(
        &self,
        cursor: &mut ScanCursor,
        queue: &UnboundedSender<ScanUnit>,
        cancel: &CancellationToken,
    ) {
        let network = self.network();
        match monitored_on(self.store.as_ref(), network).await {
            Ok(wallets) => self
                .adapter
                .watch_list()
                .replace(wallets.into_iter().map(|w| w.address)),
            Err(e) => tracing::warn!(network = %network, "Monitored address refresh failed: {}", e),
        }

        if self.adapter.scan_mode() == ScanMode::AddressWindows {
            let now = Utc::now();
            let span = chrono::Duration::hours(1);
            for address in self.adapter.watch_list().snapshot() {
                self.enqueue(
                    queue,
                    ScanUnit::Window {
                        address,
                        start: now - span,
                        end: now + span,
                    },
                );
            }
            self.status.set_state(ScanState::Steady);
            return;
        }

        let head = match self.bounded(self.adapter.fetch_head()).await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(network = %network, "Head fetch failed: {}", e);
                return;
            }
        };

        match cursor.advance(head, self.confirmed_mode) {
            TickPlan::Initialize { head, backfill } => {
                self.status.set_cursor(head);
                tracing::info!(network = %network, head, "Cursor initialized");
                match backfill {
                    Some(range) => {
                        self.status.set_state(ScanState::Backfilling);
                        tokio::spawn(backfill_range(
                            range,
                            queue.clone(),
                            self.status.clone(),
                            self.config.backfill_trickle,
                            cancel.clone(),
                        ));
                    }
                    None => self.status.set_state(ScanState::Steady),
                }
            }
            TickPlan::Resync { head, skipped } => {
                tracing::warn!(
                    network = %network,
                    from = skipped.start(),
                    to = skipped.end(),
                    "Block gap exceeds limit, skipping to head"
                );
                self.status.set_cursor(head);
            }
            TickPlan::Enqueue(range) => {
                let end = *range.end();
                for n in range {
                    self.enqueue(queue, ScanUnit::Block(n));
                }
                self.status.set_cursor(end);
            }
            TickPlan::Idle => {}
        }
    }

    fn enqueue(&self, queue: &UnboundedSender<ScanUnit>, unit: ScanUnit) {
        if queue.send(unit).is_ok() {
            self.status.enqueued(1);
        }
    }

    async fn dispatch(
        self: Arc<Self>,
        mut units: UnboundedReceiver<ScanUnit>,
        requeue: UnboundedSender<ScanUnit>,
        cancel: CancellationToken,
    ) {
        let workers = Arc::new(Semaphore::new(self.config.workers));
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = workers.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let unit = tokio::select! {
                _ = cancel.cancelled() => break,
                unit = units.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
            };
            self.status.dequeued();

            let scanner = self.clone();
            let requeue = requeue.clone();
            tokio::spawn(async move {
                scanner.work(unit, requeue).await;
                drop(permit);
            });
        }
    }

    async fn work(&self, unit: ScanUnit, requeue: UnboundedSender<ScanUnit>) {
        let network = self.network();
        match self.bounded(self.adapter.fetch_and_parse(&unit)).await {
            Ok(mut transfers) => {
                let rate = self.status.record_unit(true);
                tracing::debug!(
                    network = %network,
                    unit = %unit,
                    transfers = transfers.len(),
                    success_rate = rate,
                    "Unit scanned"
                );
                if transfers.is_empty() {
                    return;
                }
                if self.confirmed_mode && self.adapter.scan_mode() == ScanMode::Blocks {
                    // Units below the offset head are final by construction.
                    transfers.iter_mut().for_each(|t| t.confirmed = true);
                }
                if self.sink.send(transfers).is_err() {
                    tracing::warn!(network = %network, "Transfer sink closed");
                }
            }
            Err(e) => {
                self.status.record_unit(false);
                if e.is_upstream() {
                    tracing::warn!(network = %network, unit = %unit, "Unit failed, requeueing: {}", e);
                } else {
                    tracing::error!(network = %network, unit = %unit, "Unit failed locally, requeueing: {}", e);
                }
                let status = self.status.clone();
                let delay = self.config.requeue_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if requeue.send(unit).is_ok() {
                        status.enqueued(1);
                    }
                });
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.rpc_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(limit)),
        }
    }
}

/// Enqueues `range` newest first, pausing `trickle` between units.
async fn backfill_range(
    range: RangeInclusive<u64>,
    queue: UnboundedSender<ScanUnit>,
    status: Arc<ScannerStatus>,
    trickle: Duration,
    cancel: CancellationToken,
) {
    let (start, end) = (*range.start(), *range.end());
    tracing::info!(network = %status.network(), from = start, to = end, "Backfill started");
    for n in range.rev() {
        if cancel.is_cancelled() {
            return;
        }
        if queue.send(ScanUnit::Block(n)).is_err() {
            return;
        }
        status.enqueued(1);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(trickle) => {}
        }
    }
    status.set_state(ScanState::Steady);
    tracing::info!(network = %status.network(), "Backfill finished");
}
