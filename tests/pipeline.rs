use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use stable_gate::{
    models::{
        ApiType, NewOrder, Network, NotifyState, OrderStatus, TradeOrder, TradeType, Transfer,
        WalletAddress, WebhookPayload,
    },
    services::{notify::sign, *},
};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &str = "merchant-secret";

/// Merchant endpoint recording every webhook and answering with a fixed body.
#[derive(Clone)]
struct Merchant {
    reply: &'static str,
    received: Arc<Mutex<Vec<WebhookPayload>>>,
}

async fn receive(State(merchant): State<Merchant>, Json(payload): Json<WebhookPayload>) -> &'static str {
    merchant.received.lock().unwrap().push(payload);
    merchant.reply
}

async fn merchant(reply: &'static str) -> (String, Merchant) {
    let merchant = Merchant {
        reply,
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/notify", post(receive))
        .with_state(merchant.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/notify", addr), merchant)
}

struct Gateway {
    store: Arc<MemoryStore>,
    matcher: OrderMatcher,
    analytics: Arc<Analytics>,
}

fn gateway() -> Gateway {
    let store = Arc::new(MemoryStore::new());
    store.upsert_wallet(WalletAddress::enabled(TradeType::UsdtTrc20, "TAddr1"));
    let analytics = Arc::new(Analytics::new());
    let announcer: Arc<dyn Announcer> = Arc::new(LogAnnouncer);
    let notifier = Arc::new(Notifier::new(
        reqwest::Client::new(),
        store.clone(),
        Arc::new(CacheService::memory_only(Duration::from_secs(60))),
        announcer.clone(),
        analytics.clone(),
        SECRET.to_string(),
    ));
    let matcher = OrderMatcher::new(store.clone(), notifier, announcer, analytics.clone(), false);
    Gateway {
        store,
        matcher,
        analytics,
    }
}

async fn place_order(store: &MemoryStore, notify_url: &str) -> TradeOrder {
    let order = TradeOrder::waiting(
        NewOrder {
            order_id: "shop-1001".into(),
            address: "TAddr1".into(),
            trade_type: TradeType::UsdtTrc20,
            fiat_amount: Decimal::from(72),
            amount: "10".into(),
            notify_url: notify_url.into(),
            api_type: ApiType::Json,
            expires_in: ChronoDuration::seconds(900),
        },
        Utc::now(),
    );
    store.insert_order(order.clone()).await.unwrap();
    order
}

fn payment(tx: &str) -> Transfer {
    Transfer {
        network: Network::Tron,
        trade_type: TradeType::UsdtTrc20,
        tx_hash: tx.into(),
        from_address: "TPayer".into(),
        to_address: "TAddr1".into(),
        amount: Decimal::from_str("10.000000").unwrap(),
        block_num: 0,
        timestamp: Utc::now(),
        success: true,
        confirmed: true,
    }
}

#[tokio::test]
async fn paid_order_notifies_merchant_once() {
    let (url, merchant) = merchant("ok").await;
    let gw = gateway();
    let order = place_order(&gw.store, &url).await;

    let mut report = gw.matcher.process(vec![payment("0xabc")]).await.unwrap();
    assert_eq!(report.matched, vec![order.trade_id.clone()]);
    report.wait_deliveries().await;

    let stored = gw.store.get_order(&order.trade_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
    assert_eq!(stored.notify_state, NotifyState::Success);
    assert_eq!(stored.trade_hash.as_deref(), Some("0xabc"));

    {
        let received = merchant.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let payload = &received[0];
        assert_eq!(payload.status, 2);
        assert_eq!(payload.order_id, "shop-1001");
        assert_eq!(payload.block_transaction_id, "0xabc");
        assert!(payload.nonce.is_some());
        assert_eq!(payload.signature, sign(&payload.signed_fields(), SECRET));
    }

    // The same transfer observed again settles nothing and sends nothing.
    let mut again = gw.matcher.process(vec![payment("0xabc")]).await.unwrap();
    again.wait_deliveries().await;
    assert!(again.matched.is_empty());
    assert_eq!(merchant.received.lock().unwrap().len(), 1);

    let (matched, _, delivered, failed) = gw.analytics.counters();
    assert_eq!((matched, delivered, failed), (1, 1, 0));
}

#[tokio::test]
async fn rejected_webhook_marks_fail_without_retrying() {
    let (url, merchant) = merchant("fail").await;
    let gw = gateway();
    let order = place_order(&gw.store, &url).await;

    let mut report = gw.matcher.process(vec![payment("0xdef")]).await.unwrap();
    report.wait_deliveries().await;

    let stored = gw.store.get_order(&order.trade_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Success);
    assert_eq!(stored.notify_state, NotifyState::Fail);
    assert_eq!(stored.notify_num, 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(merchant.received.lock().unwrap().len(), 1);

    let failed = gw.store.list_notify_failed().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].trade_id, order.trade_id);
}
