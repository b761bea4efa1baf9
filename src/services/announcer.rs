use crate::models::{Direction, TradeOrder, Transfer};
use async_trait::async_trait;

/// Presentation side (chat bot or similar) told about payment events.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn trade_succeeded(&self, order: &TradeOrder);

    async fn non_order_transfer(&self, transfer: &Transfer, direction: Direction);

    async fn notify_failed(&self, order: &TradeOrder, reason: &str);
}

/// Renders announcements into the log.
#[derive(Default)]
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn trade_succeeded(&self, order: &TradeOrder) {
        let hash = order.trade_hash.as_deref().unwrap_or_default();
        tracing::info!(
            trade_id = %order.trade_id,
            order_id = %order.order_id,
            fiat = %order.fiat_amount,
            amount = %order.amount,
            trade_type = %order.trade_type,
            address = %mask_address(&order.address),
            link = %order.trade_type.network().explorer_tx_url(hash),
            "Payment received"
        );
    }

    async fn non_order_transfer(&self, transfer: &Transfer, direction: Direction) {
        tracing::info!(
            direction = ?direction,
            amount = %transfer.amount,
            trade_type = %transfer.trade_type,
            from = %mask_address(&transfer.from_address),
            to = %mask_address(&transfer.to_address),
            at = %transfer.timestamp.format("%Y-%m-%d %H:%M:%S"),
            link = %transfer.network.explorer_tx_url(&transfer.tx_hash),
            "Non-order transfer"
        );
    }

    async fn notify_failed(&self, order: &TradeOrder, reason: &str) {
        tracing::warn!(
            trade_id = %order.trade_id,
            order_id = %order.order_id,
            notify_num = order.notify_num,
            reason = reason,
            "Merchant notification failed"
        );
    }
}

/// Keeps the first and last six characters of an address.
pub fn mask_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}***{}", head, tail)
}
