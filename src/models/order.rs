use crate::models::TradeType;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Waiting,
    Success,
    Expired,
}

impl OrderStatus {
    /// Status code carried in merchant webhooks.
    pub fn code(&self) -> u8 {
        match self {
            OrderStatus::Waiting => 1,
            OrderStatus::Success => 2,
            OrderStatus::Expired => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyState {
    Pending,
    Success,
    Fail,
}

/// Which webhook flavour the merchant integrated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Signed GET query string, body must contain "success".
    Legacy,
    /// Signed JSON POST, body must be exactly "ok".
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub trade_id: String,
    pub order_id: String,
    pub address: String,
    pub trade_type: TradeType,
    /// Requested fiat (CNY) amount.
    #[serde(with = "rust_decimal::serde::str")]
    pub fiat_amount: Decimal,
    /// Quoted crypto amount, exact decimal string.
    pub amount: String,
    pub status: OrderStatus,
    pub notify_state: NotifyState,
    pub notify_num: u32,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub trade_hash: Option<String>,
    pub from_address: Option<String>,
    pub notify_url: String,
    pub api_type: ApiType,
}

/// Fields written by a Waiting -> Success/Expired transition.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderTransition {
    Paid {
        from_address: String,
        trade_hash: String,
        confirmed_at: DateTime<Utc>,
    },
    Expired,
}

impl OrderTransition {
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderTransition::Paid { .. } => OrderStatus::Success,
            OrderTransition::Expired => OrderStatus::Expired,
        }
    }
}

/// Inputs an order-creation collaborator supplies.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub address: String,
    pub trade_type: TradeType,
    pub fiat_amount: Decimal,
    pub amount: String,
    pub notify_url: String,
    pub api_type: ApiType,
    pub expires_in: Duration,
}

impl TradeOrder {
    pub fn waiting(new: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            trade_id: Uuid::new_v4().simple().to_string(),
            order_id: new.order_id,
            address: new.trade_type.network().normalize_address(&new.address),
            trade_type: new.trade_type,
            fiat_amount: new.fiat_amount,
            amount: new.amount,
            status: OrderStatus::Waiting,
            notify_state: NotifyState::Pending,
            notify_num: 0,
            created_at: now,
            expired_at: now + new.expires_in,
            confirmed_at: None,
            trade_hash: None,
            from_address: None,
            notify_url: new.notify_url,
            api_type: new.api_type,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expired_at
    }

    /// Whether `ts` falls inside `[created_at, expired_at]`, compared at second precision.
    pub fn accepts_timestamp(&self, ts: DateTime<Utc>) -> bool {
        let ts = ts.timestamp();
        ts >= self.created_at.timestamp() && ts <= self.expired_at.timestamp()
    }

    pub fn apply(&mut self, transition: &OrderTransition) {
        self.status = transition.target();
        if let OrderTransition::Paid {
            from_address,
            trade_hash,
            confirmed_at,
        } = transition
        {
            self.from_address = Some(from_address.clone());
            self.trade_hash = Some(trade_hash.clone());
            self.confirmed_at = Some(*confirmed_at);
        }
    }
}
