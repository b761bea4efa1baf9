use crate::models::TradeType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Enabled,
    Disabled,
}

/// A receiving address under monitoring. Owned by the admin side; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: String,
    pub trade_type: TradeType,
    pub status: WalletStatus,
    /// Report transfers that do not settle an order.
    pub other_notify: bool,
    pub name: String,
}

impl WalletAddress {
    pub fn enabled(trade_type: TradeType, address: &str) -> Self {
        Self {
            address: trade_type.network().normalize_address(address),
            trade_type,
            status: WalletStatus::Enabled,
            other_notify: false,
            name: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == WalletStatus::Enabled
    }
}
