use crate::{
    error::Result,
    models::{amount, OrderStatus, OrderTransition, TradeOrder, TradeType, Transfer, WalletAddress},
    services::{Analytics, Announcer, Notifier, OrderStore},
};
use chrono::{DateTime, Utc};
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type MatchKey = (TradeType, String, String);

#[derive(Debug, Default)]
pub struct Sweep {
    pub waiting: Vec<TradeOrder>,
    pub expired: usize,
}

/// Result of one matching pass.
#[derive(Debug, Default)]
pub struct MatchReport {
    pub expired: usize,
    pub matched: Vec<String>,
    pub rejected: usize,
    pub announced: usize,
    /// Transfers whose store calls failed; the run loop feeds them into the next pass.
    pub deferred: Vec<Transfer>,
    /// Webhook + announcement tasks started for the matched orders.
    pub deliveries: Vec<JoinHandle<()>>,
}

impl MatchReport {
    pub async fn wait_deliveries(&mut self) {
        for handle in self.deliveries.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Delivery task panicked: {}", e);
            }
        }
    }
}

/// Settles Waiting orders against observed transfers.
///
/// Holds no lock across a pass: every status change is a conditional store update guarded by
/// `status == Waiting`, so a concurrent admin override or a second observation of the same
/// transfer simply loses the race.
pub struct OrderMatcher {
    store: Arc<dyn OrderStore>,
    notifier: Arc<Notifier>,
    announcer: Arc<dyn Announcer>,
    analytics: Arc<Analytics>,
    trade_is_confirmed: bool,
}

impl OrderMatcher {
    pub fn new(
        store: Arc<dyn OrderStore>,
        notifier: Arc<Notifier>,
        announcer: Arc<dyn Announcer>,
        analytics: Arc<Analytics>,
        trade_is_confirmed: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            announcer,
            analytics,
            trade_is_confirmed,
        }
    }

    /// Expires overdue orders and returns the ones still Waiting.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Sweep> {
        let mut sweep = Sweep::default();
        for order in self.store.list_waiting_orders().await? {
            if !order.is_expired(now) {
                sweep.waiting.push(order);
                continue;
            }
            let applied = self
                .store
                .update_order_status(&order.trade_id, OrderStatus::Waiting, OrderTransition::Expired)
                .await?;
            if applied.is_some() {
                sweep.expired += 1;
                self.analytics.order_expired();
                tracing::info!(trade_id = %order.trade_id, order_id = %order.order_id, "Order expired");
            }
        }
        Ok(sweep)
    }

    pub async fn process(&self, transfers: Vec<Transfer>) -> Result<MatchReport> {
        let sweep = self.sweep(Utc::now()).await?;
        let mut report = MatchReport {
            expired: sweep.expired,
            ..Default::default()
        };
        let mut lookup = build_lookup(sweep.waiting);
        let monitored = self.monitored().await?;

        for transfer in transfers {
            if let Err(e) = self.match_one(&transfer, &mut lookup, &monitored, &mut report).await {
                tracing::warn!(
                    tx = %transfer.tx_hash,
                    network = %transfer.network,
                    "Transfer deferred to the next pass: {}",
                    e
                );
                report.deferred.push(transfer);
            }
        }

        Ok(report)
    }

    async fn match_one(
        &self,
        transfer: &Transfer,
        lookup: &mut HashMap<MatchKey, TradeOrder>,
        monitored: &HashMap<(TradeType, String), WalletAddress>,
        report: &mut MatchReport,
    ) -> Result<()> {
        let recipient = (transfer.trade_type, transfer.to_address.clone());
        if monitored.contains_key(&recipient) {
            let key = (transfer.trade_type, transfer.to_address.clone(), transfer.amount_key());
            if let Some(order) = lookup.get(&key).cloned() {
                match self.settle(&order, transfer).await? {
                    Settlement::Paid(paid) => {
                        lookup.remove(&key);
                        report.matched.push(paid.trade_id.clone());
                        report.deliveries.push(self.deliver(paid));
                        return Ok(());
                    }
                    Settlement::Rejected => report.rejected += 1,
                    Settlement::Lost => {
                        lookup.remove(&key);
                    }
                }
            }
        }

        if self.announce_other(transfer, monitored).await? {
            report.announced += 1;
        }
        Ok(())
    }

    async fn settle(&self, order: &TradeOrder, transfer: &Transfer) -> Result<Settlement> {
        if !transfer.success {
            tracing::debug!(trade_id = %order.trade_id, tx = %transfer.tx_hash, "Transfer failed on chain");
            return Ok(Settlement::Rejected);
        }
        if !order.accepts_timestamp(transfer.timestamp) {
            tracing::debug!(
                trade_id = %order.trade_id,
                tx = %transfer.tx_hash,
                at = %transfer.timestamp,
                "Transfer outside order validity window"
            );
            return Ok(Settlement::Rejected);
        }
        if self.trade_is_confirmed && !transfer.confirmed {
            tracing::debug!(trade_id = %order.trade_id, tx = %transfer.tx_hash, "Transfer not yet confirmed");
            return Ok(Settlement::Rejected);
        }

        let transition = OrderTransition::Paid {
            from_address: transfer.from_address.clone(),
            trade_hash: transfer.tx_hash.clone(),
            confirmed_at: transfer.timestamp,
        };
        match self
            .store
            .update_order_status(&order.trade_id, OrderStatus::Waiting, transition)
            .await?
        {
            Some(paid) => {
                self.analytics.order_matched();
                // Later sightings of the payment are not non-order transfers.
                if let Err(e) = self.store.record_notified_tx(&transfer.tx_hash).await {
                    tracing::warn!(trade_id = %paid.trade_id, "Could not mark payment tx as claimed: {}", e);
                }
                tracing::info!(
                    trade_id = %paid.trade_id,
                    order_id = %paid.order_id,
                    tx = %transfer.tx_hash,
                    network = %transfer.network,
                    block = transfer.block_num,
                    "Order paid"
                );
                Ok(Settlement::Paid(paid))
            }
            None => {
                tracing::debug!(trade_id = %order.trade_id, "Order already left Waiting");
                Ok(Settlement::Lost)
            }
        }
    }

    fn deliver(&self, order: TradeOrder) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let announcer = self.announcer.clone();
        tokio::spawn(async move {
            announcer.trade_succeeded(&order).await;
            if let Err(e) = notifier.notify(&order).await {
                tracing::warn!(trade_id = %order.trade_id, "Notification bookkeeping failed: {}", e);
            }
        })
    }

    /// Non-order path: announce transfers touching an `other_notify` address once per tx.
    async fn announce_other(
        &self,
        transfer: &Transfer,
        monitored: &HashMap<(TradeType, String), WalletAddress>,
    ) -> Result<bool> {
        if !transfer.success {
            return Ok(false);
        }
        let touched = monitored
            .values()
            .filter(|w| w.other_notify && w.trade_type == transfer.trade_type)
            .find_map(|w| transfer.touches(&w.address));
        let Some(direction) = touched else {
            return Ok(false);
        };

        if self.store.is_tx_notified(&transfer.tx_hash).await? {
            return Ok(false);
        }
        if !self.store.record_notified_tx(&transfer.tx_hash).await? {
            return Ok(false);
        }
        self.announcer.non_order_transfer(transfer, direction).await;
        Ok(true)
    }

    async fn monitored(&self) -> Result<HashMap<(TradeType, String), WalletAddress>> {
        Ok(self
            .store
            .list_monitored_addresses()
            .await?
            .into_iter()
            .filter(|w| w.is_enabled())
            .map(|w| ((w.trade_type, w.address.clone()), w))
            .collect())
    }

    /// One matching pass; returns what has to be tried again.
    async fn pass(&self, batch: Vec<Transfer>) -> Vec<Transfer> {
        match self.process(batch.clone()).await {
            Ok(report) => report.deferred,
            Err(e) => {
                tracing::warn!(transfers = batch.len(), "Matching pass failed, deferring batch: {}", e);
                batch
            }
        }
    }

    /// Consumes transfer batches from the scanners and sweeps expirations between them.
    pub async fn run(
        self: Arc<Self>,
        mut transfers: UnboundedReceiver<Vec<Transfer>>,
        sweep_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(sweep_interval);
        let mut deferred: Vec<Transfer> = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                batch = transfers.recv() => {
                    let Some(batch) = batch else { break };
                    deferred.extend(batch);
                    deferred = self.pass(std::mem::take(&mut deferred)).await;
                }
                _ = ticker.tick() => {
                    if deferred.is_empty() {
                        if let Err(e) = self.sweep(Utc::now()).await {
                            tracing::warn!("Expiry sweep failed: {}", e);
                        }
                    } else {
                        deferred = self.pass(std::mem::take(&mut deferred)).await;
                    }
                }
            }
        }
        if !deferred.is_empty() {
            tracing::warn!(pending = deferred.len(), "Matcher stopped with deferred transfers");
        }
        tracing::info!("Order matcher stopped");
    }
}

enum Settlement {
    Paid(TradeOrder),
    Rejected,
    /// The conditional update found the order no longer Waiting.
    Lost,
}

/// Indexes Waiting orders by `(trade_type, address, canonical amount)`; the earliest order
/// keeps a contested key.
fn build_lookup(mut orders: Vec<TradeOrder>) -> HashMap<MatchKey, TradeOrder> {
    orders.sort_by_key(|o| o.created_at);
    let mut lookup = HashMap::with_capacity(orders.len());
    for order in orders {
        let Some(amount) = amount::canonical_str(&order.amount) else {
            tracing::warn!(trade_id = %order.trade_id, amount = %order.amount, "Unparsable quoted amount");
            continue;
        };
        match lookup.entry((order.trade_type, order.address.clone(), amount)) {
            Entry::Vacant(slot) => {
                slot.insert(order);
            }
            Entry::Occupied(held) => {
                tracing::warn!(
                    trade_id = %order.trade_id,
                    held_by = %held.get().trade_id,
                    address = %order.address,
                    amount = %order.amount,
                    "Matching key collision, earlier order takes precedence"
                );
            }
        }
    }
    lookup
}
