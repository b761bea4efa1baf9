//! Chain scanning: a generic cursor/queue/worker framework plus one adapter per chain family.

pub mod cursor;
pub mod evm;
pub mod scanner;
pub mod solana;
pub mod tron;

pub use cursor::{ScanCursor, TickPlan};
pub use evm::EvmAdapter;
pub use scanner::Scanner;
pub use solana::SolanaAdapter;
pub use tron::TronAdapter;

use crate::{
    error::Result,
    models::{Network, Transfer},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::RwLock;

/// One unit of scanning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanUnit {
    /// A block (EVM) or slot (Solana).
    Block(u64),
    /// Transfers touching `address` inside `[start, end]`.
    Window {
        address: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl std::fmt::Display for ScanUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanUnit::Block(n) => write!(f, "block {}", n),
            ScanUnit::Window { address, .. } => write!(f, "window {}", address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Cursor over block/slot numbers with backfill and resync.
    Blocks,
    /// One time window per monitored address on every tick.
    AddressWindows,
}

/// Monitored addresses of one network. Refreshed by the scanner every tick, read by the
/// adapter while parsing.
#[derive(Debug, Default)]
pub struct WatchList {
    addresses: RwLock<HashSet<String>>,
}

impl WatchList {
    pub fn replace(&self, addresses: impl IntoIterator<Item = String>) {
        if let Ok(mut guard) = self.addresses.write() {
            *guard = addresses.into_iter().collect();
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses
            .read()
            .map(|a| a.contains(address))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .addresses
            .read()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.read().map(|a| a.is_empty()).unwrap_or(true)
    }
}

/// Chain-specific fetch and transfer extraction plugged into [`Scanner`].
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn network(&self) -> Network;

    fn scan_mode(&self) -> ScanMode {
        ScanMode::Blocks
    }

    fn watch_list(&self) -> &WatchList;

    /// Current chain head. Address-window adapters return a wall-clock marker instead.
    async fn fetch_head(&self) -> Result<u64>;

    async fn fetch_and_parse(&self, unit: &ScanUnit) -> Result<Vec<Transfer>>;
}
