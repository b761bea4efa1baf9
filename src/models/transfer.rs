use crate::models::{amount, Network, TradeType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A token movement extracted from chain data, consumed once by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub network: Network,
    pub trade_type: TradeType,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub block_num: u64,
    pub timestamp: DateTime<Utc>,
    /// On-chain execution result.
    pub success: bool,
    /// Old enough to be considered final.
    pub confirmed: bool,
}

impl Transfer {
    pub fn amount_key(&self) -> String {
        amount::canonical(self.amount)
    }

    pub fn touches(&self, address: &str) -> Option<Direction> {
        if self.to_address == address {
            Some(Direction::Income)
        } else if self.from_address == address {
            Some(Direction::Expense)
        } else {
            None
        }
    }
}

/// Movement direction relative to a monitored address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Income,
    Expense,
}
