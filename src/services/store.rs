use crate::error::{GatewayError, Result};
use crate::models::{
    Network, NotifyState, OrderStatus, OrderTransition, TradeOrder, WalletAddress,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

/// Read/write contract the engine needs from persistent storage.
///
/// Every status change goes through [`OrderStore::update_order_status`], which must apply only
/// when the stored status still equals `from`. That conditional write is the only
/// synchronisation between scanners, the notifier and admin tooling.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: TradeOrder) -> Result<()>;

    async fn get_order(&self, trade_id: &str) -> Result<Option<TradeOrder>>;

    async fn list_waiting_orders(&self) -> Result<Vec<TradeOrder>>;

    /// Returns the updated order when the transition applied, `None` when the stored status
    /// no longer equals `from`.
    async fn update_order_status(
        &self,
        trade_id: &str,
        from: OrderStatus,
        transition: OrderTransition,
    ) -> Result<Option<TradeOrder>>;

    async fn set_notify_state(&self, trade_id: &str, state: NotifyState) -> Result<()>;

    /// Bumps the retry counter and returns the new value.
    async fn increment_notify_num(&self, trade_id: &str) -> Result<u32>;

    async fn list_notify_failed(&self) -> Result<Vec<TradeOrder>>;

    /// Enabled and disabled addresses alike; callers filter.
    async fn list_monitored_addresses(&self) -> Result<Vec<WalletAddress>>;

    async fn is_tx_notified(&self, txid: &str) -> Result<bool>;

    /// Inserts the dedup marker. Returns `false` when it already existed.
    async fn record_notified_tx(&self, txid: &str) -> Result<bool>;
}

/// Enabled addresses for one network, normalized for comparison.
pub async fn monitored_on(store: &dyn OrderStore, network: Network) -> Result<Vec<WalletAddress>> {
    Ok(store
        .list_monitored_addresses()
        .await?
        .into_iter()
        .filter(|w| w.is_enabled() && w.trade_type.network() == network)
        .collect())
}

#[derive(Default)]
pub struct MemoryStore {
    orders: DashMap<String, TradeOrder>,
    wallets: DashMap<(String, String), WalletAddress>,
    notified: DashMap<String, ()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_wallet(&self, wallet: WalletAddress) {
        let key = (wallet.trade_type.to_string(), wallet.address.clone());
        self.wallets.insert(key, wallet);
    }

    fn with_order<T>(&self, trade_id: &str, f: impl FnOnce(&mut TradeOrder) -> T) -> Result<T> {
        let mut order = self
            .orders
            .get_mut(trade_id)
            .ok_or_else(|| GatewayError::OrderNotFound(trade_id.to_string()))?;
        Ok(f(order.value_mut()))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: TradeOrder) -> Result<()> {
        match self.orders.entry(order.trade_id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::StoreError(format!(
                "duplicate trade_id {}",
                order.trade_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn get_order(&self, trade_id: &str) -> Result<Option<TradeOrder>> {
        Ok(self.orders.get(trade_id).map(|o| o.value().clone()))
    }

    async fn list_waiting_orders(&self) -> Result<Vec<TradeOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Waiting)
            .map(|o| o.value().clone())
            .collect())
    }

    async fn update_order_status(
        &self,
        trade_id: &str,
        from: OrderStatus,
        transition: OrderTransition,
    ) -> Result<Option<TradeOrder>> {
        // The shard write lock is held between the check and the write.
        self.with_order(trade_id, |order| {
            if order.status != from {
                return None;
            }
            order.apply(&transition);
            Some(order.clone())
        })
    }

    async fn set_notify_state(&self, trade_id: &str, state: NotifyState) -> Result<()> {
        self.with_order(trade_id, |order| order.notify_state = state)
    }

    async fn increment_notify_num(&self, trade_id: &str) -> Result<u32> {
        self.with_order(trade_id, |order| {
            order.notify_num += 1;
            order.notify_num
        })
    }

    async fn list_notify_failed(&self) -> Result<Vec<TradeOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Success && o.notify_state == NotifyState::Fail)
            .map(|o| o.value().clone())
            .collect())
    }

    async fn list_monitored_addresses(&self) -> Result<Vec<WalletAddress>> {
        Ok(self.wallets.iter().map(|w| w.value().clone()).collect())
    }

    async fn is_tx_notified(&self, txid: &str) -> Result<bool> {
        Ok(self.notified.contains_key(txid))
    }

    async fn record_notified_tx(&self, txid: &str) -> Result<bool> {
        Ok(self.notified.insert(txid.to_string(), ()).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiType, NewOrder, TradeType, WalletStatus};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn new_order() -> TradeOrder {
        TradeOrder::waiting(
            NewOrder {
                order_id: "m-1".into(),
                address: "TAddr1".into(),
                trade_type: TradeType::UsdtTrc20,
                fiat_amount: Decimal::from(72),
                amount: "10".into(),
                notify_url: "http://merchant/notify".into(),
                api_type: ApiType::Json,
                expires_in: Duration::seconds(900),
            },
            Utc::now(),
        )
    }

    fn paid() -> OrderTransition {
        OrderTransition::Paid {
            from_address: "TPayer".into(),
            trade_hash: "hash1".into(),
            confirmed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn transition_applies_once() {
        let store = MemoryStore::new();
        let order = new_order();
        let id = order.trade_id.clone();
        store.insert_order(order).await.unwrap();

        let first = store
            .update_order_status(&id, OrderStatus::Waiting, paid())
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, OrderStatus::Success);

        let second = store
            .update_order_status(&id, OrderStatus::Waiting, OrderTransition::Expired)
            .await
            .unwrap();
        assert!(second.is_none());
        let stored = store.get_order(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
    }

    #[tokio::test]
    async fn racing_transitions_have_a_single_winner() {
        let store = Arc::new(MemoryStore::new());
        let order = new_order();
        let id = order.trade_id.clone();
        store.insert_order(order).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let transition = if i % 2 == 0 { paid() } else { OrderTransition::Expired };
                    store
                        .update_order_status(&id, OrderStatus::Waiting, transition)
                        .await
                        .unwrap()
                        .is_some()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert!(store.list_waiting_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_trade_ids_are_refused() {
        let store = MemoryStore::new();
        let order = new_order();
        store.insert_order(order.clone()).await.unwrap();
        assert!(store.insert_order(order).await.is_err());
    }

    #[tokio::test]
    async fn notified_tx_marker_is_insert_once() {
        let store = MemoryStore::new();
        assert!(!store.is_tx_notified("tx1").await.unwrap());
        assert!(store.record_notified_tx("tx1").await.unwrap());
        assert!(!store.record_notified_tx("tx1").await.unwrap());
        assert!(store.is_tx_notified("tx1").await.unwrap());
    }

    #[tokio::test]
    async fn monitored_on_filters_network_and_status() {
        let store = MemoryStore::new();
        store.upsert_wallet(WalletAddress::enabled(TradeType::UsdtTrc20, "TAddr1"));
        store.upsert_wallet(WalletAddress::enabled(TradeType::UsdtPolygon, "0xAA"));
        let mut disabled = WalletAddress::enabled(TradeType::UsdtTrc20, "TAddr2");
        disabled.status = WalletStatus::Disabled;
        store.upsert_wallet(disabled);

        let tron = monitored_on(&store, Network::Tron).await.unwrap();
        assert_eq!(tron.len(), 1);
        assert_eq!(tron[0].address, "TAddr1");
    }

    #[tokio::test]
    async fn unknown_orders_error() {
        let store = MemoryStore::new();
        let err = store.set_notify_state("nope", NotifyState::Fail).await;
        assert!(matches!(err, Err(GatewayError::OrderNotFound(_))));
    }
}
