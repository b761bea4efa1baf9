use crate::models::{amount, TradeOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of the JSON webhook. The legacy variant sends the same fields as a query string,
/// with `checksum` in place of `signature` and no nonce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub trade_id: String,
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub actual_amount: Decimal,
    pub token: String,
    pub block_transaction_id: String,
    pub signature: String,
    pub status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl WebhookPayload {
    pub fn from_order(order: &TradeOrder, nonce: Option<String>) -> Self {
        Self {
            trade_id: order.trade_id.clone(),
            order_id: order.order_id.clone(),
            amount: order.fiat_amount,
            actual_amount: amount::parse(&order.amount).unwrap_or_default(),
            token: order.address.clone(),
            block_transaction_id: order.trade_hash.clone().unwrap_or_default(),
            signature: String::new(),
            status: order.status.code(),
            nonce,
        }
    }

    /// Fields covered by the signature, keyed in ASCII order. Empty values are left out.
    pub fn signed_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("trade_id", self.trade_id.clone());
        fields.insert("order_id", self.order_id.clone());
        fields.insert("amount", amount::canonical(self.amount));
        fields.insert("actual_amount", amount::canonical(self.actual_amount));
        fields.insert("token", self.token.clone());
        fields.insert("block_transaction_id", self.block_transaction_id.clone());
        fields.insert("status", self.status.to_string());
        if let Some(nonce) = &self.nonce {
            fields.insert("nonce", nonce.clone());
        }
        fields.retain(|_, v| !v.is_empty());
        fields
    }
}
