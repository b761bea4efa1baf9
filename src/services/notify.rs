use crate::{
    error::{GatewayError, Result},
    models::{ApiType, NotifyState, OrderStatus, TradeOrder, WebhookPayload},
    services::{Analytics, Announcer, CacheService, OrderStore},
};
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    Failed(String),
    /// Another delivery for the same (order, status) ran inside the idempotency window.
    Suppressed,
    /// Only successful orders are announced to merchants.
    Skipped,
}

/// Delivers merchant webhooks and tracks notify state.
///
/// Retry cadence is not decided here: a failed delivery leaves `notify_state = Fail` and an
/// external scheduler calls [`Notifier::retry`] when it sees fit.
pub struct Notifier {
    client: reqwest::Client,
    store: Arc<dyn OrderStore>,
    cache: Arc<CacheService>,
    announcer: Arc<dyn Announcer>,
    analytics: Arc<Analytics>,
    secret: String,
}

impl Notifier {
    pub fn new(
        client: reqwest::Client,
        store: Arc<dyn OrderStore>,
        cache: Arc<CacheService>,
        announcer: Arc<dyn Announcer>,
        analytics: Arc<Analytics>,
        secret: String,
    ) -> Self {
        Self {
            client,
            store,
            cache,
            announcer,
            analytics,
            secret,
        }
    }

    pub async fn notify(&self, order: &TradeOrder) -> Result<NotifyOutcome> {
        if order.status != OrderStatus::Success {
            return Ok(NotifyOutcome::Skipped);
        }
        if !self.claim(order).await {
            return Ok(NotifyOutcome::Suppressed);
        }
        self.dispatch(order).await
    }

    /// Re-delivers the webhook of a stored order. The retry counter only moves when a request
    /// is actually sent.
    pub async fn retry(&self, trade_id: &str) -> Result<NotifyOutcome> {
        let mut order = self
            .store
            .get_order(trade_id)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(trade_id.to_string()))?;
        if order.status != OrderStatus::Success {
            return Ok(NotifyOutcome::Skipped);
        }
        if !self.claim(&order).await {
            return Ok(NotifyOutcome::Suppressed);
        }
        order.notify_num = self.store.increment_notify_num(trade_id).await?;
        tracing::info!(trade_id = %trade_id, notify_num = order.notify_num, "Retrying merchant notification");
        self.dispatch(&order).await
    }

    async fn claim(&self, order: &TradeOrder) -> bool {
        let key = format!("notify:{}:{}", order.status.code(), order.trade_id);
        let claimed = self.cache.try_claim(&key).await;
        if !claimed {
            tracing::debug!(trade_id = %order.trade_id, "Notification suppressed, already in flight");
        }
        claimed
    }

    async fn dispatch(&self, order: &TradeOrder) -> Result<NotifyOutcome> {
        let delivery = match order.api_type {
            ApiType::Legacy => self.deliver_legacy(order).await,
            ApiType::Json => self.deliver_json(order).await,
        };

        match delivery {
            Ok(()) => {
                self.store
                    .set_notify_state(&order.trade_id, NotifyState::Success)
                    .await?;
                self.analytics.notify_result(true);
                tracing::info!(trade_id = %order.trade_id, order_id = %order.order_id, "Merchant notified");
                Ok(NotifyOutcome::Delivered)
            }
            Err(e) => {
                let reason = e.to_string();
                self.store
                    .set_notify_state(&order.trade_id, NotifyState::Fail)
                    .await?;
                self.analytics.notify_result(false);
                self.announcer.notify_failed(order, &reason).await;
                Ok(NotifyOutcome::Failed(reason))
            }
        }
    }

    async fn deliver_json(&self, order: &TradeOrder) -> Result<()> {
        let mut payload = WebhookPayload::from_order(order, Some(Uuid::new_v4().simple().to_string()));
        payload.signature = sign(&payload.signed_fields(), &self.secret);

        let response = self
            .client
            .post(&order.notify_url)
            .header("User-Agent", user_agent())
            .json(&payload)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(GatewayError::UpstreamStatus(response.status().as_u16()));
        }
        let body = response.text().await?;
        if body != "ok" {
            return Err(GatewayError::NotifyRejected(format!("body != ok ({})", body)));
        }
        Ok(())
    }

    async fn deliver_legacy(&self, order: &TradeOrder) -> Result<()> {
        let payload = WebhookPayload::from_order(order, None);
        let fields = payload.signed_fields();
        let checksum = sign(&fields, &self.secret);

        let mut query: Vec<(&str, String)> = fields.into_iter().collect();
        query.push(("checksum", checksum));

        let response = self
            .client
            .get(&order.notify_url)
            .header("User-Agent", user_agent())
            .query(&query)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(GatewayError::UpstreamStatus(response.status().as_u16()));
        }
        let body = response.text().await?;
        if !body.to_lowercase().contains("success") {
            return Err(GatewayError::NotifyRejected(format!(
                "body not contains success ({})",
                body
            )));
        }
        Ok(())
    }
}

/// Lowercase hex MD5 over `k=v&k=v..` (ASCII key order) with the shared secret appended.
pub fn sign(fields: &BTreeMap<&'static str, String>, secret: &str) -> String {
    let joined = fields
        .iter()
        .filter(|(k, v)| **k != "signature" && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let digest = md5::compute(format!("{}{}", joined, secret).as_bytes());
    hex::encode(digest.0)
}

fn user_agent() -> String {
    format!("stable-gate/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewOrder, OrderTransition, TradeType};
    use crate::services::{LogAnnouncer, MemoryStore};
    use chrono::{Duration, Utc};
    use mockito::Matcher;
    use rust_decimal::Decimal;
    use std::time::Duration as StdDuration;

    const SECRET: &str = "testsecret";

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Notifier,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let notifier = Notifier::new(
            reqwest::Client::new(),
            store.clone(),
            Arc::new(CacheService::memory_only(StdDuration::from_secs(60))),
            Arc::new(LogAnnouncer),
            Arc::new(Analytics::new()),
            SECRET.to_string(),
        );
        Harness { store, notifier }
    }

    async fn paid_order(store: &MemoryStore, url: String, api_type: ApiType) -> TradeOrder {
        let order = TradeOrder::waiting(
            NewOrder {
                order_id: "m-100".into(),
                address: "TAddr1".into(),
                trade_type: TradeType::UsdtTrc20,
                fiat_amount: Decimal::from(72),
                amount: "10".into(),
                notify_url: url,
                api_type,
                expires_in: Duration::seconds(900),
            },
            Utc::now(),
        );
        let id = order.trade_id.clone();
        store.insert_order(order).await.unwrap();
        store
            .update_order_status(
                &id,
                OrderStatus::Waiting,
                OrderTransition::Paid {
                    from_address: "TPayer".into(),
                    trade_hash: "hash-1".into(),
                    confirmed_at: Utc::now(),
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn signature_covers_sorted_non_empty_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("trade_id", "abc".to_string());
        fields.insert("order_id", "def".to_string());
        fields.insert("amount", "200.12".to_string());
        fields.insert("block_transaction_id", String::new());
        fields.insert("status", "2".to_string());

        let expected = hex::encode(
            md5::compute("amount=200.12&order_id=def&status=2&trade_id=abctestsecret").0,
        );
        assert_eq!(sign(&fields, SECRET), expected);
        assert_eq!(expected.len(), 32);
        assert_eq!(expected, expected.to_lowercase());
    }

    #[tokio::test]
    async fn json_webhook_ok_marks_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "status": 2,
                "block_transaction_id": "hash-1",
                "actual_amount": 10.0
            })))
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        let outcome = h.notifier.notify(&order).await.unwrap();
        assert_eq!(outcome, NotifyOutcome::Delivered);
        mock.assert_async().await;

        let stored = h.store.get_order(&order.trade_id).await.unwrap().unwrap();
        assert_eq!(stored.notify_state, NotifyState::Success);
    }

    #[tokio::test]
    async fn json_webhook_wrong_body_marks_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notify")
            .with_status(200)
            .with_body("fail")
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        let outcome = h.notifier.notify(&order).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Failed(_)));
        let stored = h.store.get_order(&order.trade_id).await.unwrap().unwrap();
        assert_eq!(stored.notify_state, NotifyState::Fail);
        assert_eq!(h.store.list_notify_failed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_200_marks_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notify")
            .with_status(500)
            .with_body("ok")
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        let outcome = h.notifier.notify(&order).await.unwrap();
        assert_eq!(
            outcome,
            NotifyOutcome::Failed("Upstream returned status 500".to_string())
        );
    }

    #[tokio::test]
    async fn legacy_webhook_accepts_success_substring() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/epay")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "2".into()),
                Matcher::UrlEncoded("token".into(), "TAddr1".into()),
                Matcher::Regex("checksum=[0-9a-f]{32}".into()),
            ]))
            .with_status(200)
            .with_body("SUCCESS, thanks")
            .expect(1)
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/epay", server.url()), ApiType::Legacy).await;

        assert_eq!(h.notifier.notify(&order).await.unwrap(), NotifyOutcome::Delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_triggers_send_one_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        let (a, b) = tokio::join!(h.notifier.notify(&order), h.notifier.notify(&order));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == NotifyOutcome::Delivered).count(),
            1
        );
        assert!(outcomes.contains(&NotifyOutcome::Suppressed));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn waiting_orders_are_not_announced() {
        let h = harness();
        let mut order = paid_order(&h.store, "http://127.0.0.1:1/none".into(), ApiType::Json).await;
        order.status = OrderStatus::Waiting;
        assert_eq!(h.notifier.notify(&order).await.unwrap(), NotifyOutcome::Skipped);
    }

    #[tokio::test]
    async fn retry_bumps_counter() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notify")
            .with_status(200)
            .with_body("nope")
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        let outcome = h.notifier.retry(&order.trade_id).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Failed(_)));
        let stored = h.store.get_order(&order.trade_id).await.unwrap().unwrap();
        assert_eq!(stored.notify_num, 1);

        let unknown = h.notifier.retry("missing").await;
        assert!(matches!(unknown, Err(GatewayError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn legacy_webhook_without_success_marks_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/epay")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("received")
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/epay", server.url()), ApiType::Legacy).await;

        let outcome = h.notifier.notify(&order).await.unwrap();
        assert!(matches!(outcome, NotifyOutcome::Failed(ref reason) if reason.contains("success")));
        let stored = h.store.get_order(&order.trade_id).await.unwrap().unwrap();
        assert_eq!(stored.notify_state, NotifyState::Fail);
    }

    #[tokio::test]
    async fn suppressed_retry_leaves_counter_alone() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(200)
            .with_body("nope")
            .expect(1)
            .create_async()
            .await;

        let h = harness();
        let order = paid_order(&h.store, format!("{}/notify", server.url()), ApiType::Json).await;

        assert!(matches!(
            h.notifier.retry(&order.trade_id).await.unwrap(),
            NotifyOutcome::Failed(_)
        ));
        assert_eq!(
            h.notifier.retry(&order.trade_id).await.unwrap(),
            NotifyOutcome::Suppressed
        );
        mock.assert_async().await;

        let stored = h.store.get_order(&order.trade_id).await.unwrap().unwrap();
        assert_eq!(stored.notify_num, 1);
    }
}
