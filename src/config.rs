use crate::models::{Network, TradeType, WalletAddress};
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by every block/slot scanner and the Tron poller.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub interval: Duration,
    pub workers: usize,
    pub requeue_delay: Duration,
    pub backfill_trickle: Duration,
    pub max_gap: u64,
    pub rpc_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EvmChainConfig {
    pub network: Network,
    pub rpc_url: String,
}

#[derive(Debug, Clone)]
pub struct TronConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    pub api_url: String,
    pub interval: Duration,
    pub usdt: String,
    pub usdc: String,
    pub trx: String,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub auth_token: String,
    pub timeout: Duration,
    pub dedup_window: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub redis_url: Option<String>,

    pub trade_is_confirmed: bool,
    /// Lifetime of a new order. Read by the order-creation collaborator through
    /// [`Config::order_expiry`]; the engine itself only honours the stored `expired_at`.
    pub order_expire: Duration,

    pub scan: ScanConfig,
    pub tron: Option<TronConfig>,
    pub solana_rpc_url: Option<String>,
    pub evm: Vec<EvmChainConfig>,

    pub rates: RateConfig,
    pub notify: NotifyConfig,

    pub wallet_addresses: Vec<WalletAddress>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let evm = Network::EVM
            .iter()
            .filter_map(|network| {
                let var = format!("{}_RPC_URL", network.as_str().to_uppercase());
                optional(&var).map(|rpc_url| EvmChainConfig {
                    network: *network,
                    rpc_url,
                })
            })
            .collect();

        let tron = if parse_or("TRON_ENABLED", true)? {
            Some(TronConfig {
                api_url: std::env::var("TRON_API_URL")
                    .unwrap_or_else(|_| "https://apilist.tronscanapi.com".to_string()),
                api_key: optional("TRON_API_KEY"),
            })
        } else {
            None
        };

        let config = Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 8080)?,

            redis_url: optional("REDIS_URL"),

            trade_is_confirmed: parse_or("TRADE_IS_CONFIRMED", false)?,
            order_expire: Duration::from_secs(parse_or("ORDER_EXPIRE_SECONDS", 1200)?),

            scan: ScanConfig {
                interval: Duration::from_secs(parse_or("SCAN_INTERVAL_SECS", 5)?),
                workers: parse_or("SCAN_WORKERS", 3)?,
                requeue_delay: Duration::from_millis(parse_or("REQUEUE_DELAY_MS", 500)?),
                backfill_trickle: Duration::from_millis(parse_or("BACKFILL_TRICKLE_MS", 300)?),
                max_gap: parse_or("BLOCK_HEIGHT_MAX_DIFF", 1000)?,
                rpc_timeout: Duration::from_secs(parse_or("RPC_TIMEOUT_SECS", 10)?),
            },
            tron,
            solana_rpc_url: optional("SOLANA_RPC_URL"),
            evm,

            rates: RateConfig {
                api_url: std::env::var("RATE_API_URL")
                    .unwrap_or_else(|_| "https://www.okx.com".to_string()),
                interval: Duration::from_secs(parse_or(
                    "EXCHANGE_RATE_UPDATE_INTERVAL_SECS",
                    1800,
                )?),
                usdt: std::env::var("USDT_RATE").unwrap_or_default(),
                usdc: std::env::var("USDC_RATE").unwrap_or_default(),
                trx: std::env::var("TRX_RATE").unwrap_or_default(),
            },
            notify: NotifyConfig {
                auth_token: std::env::var("AUTH_TOKEN").context("AUTH_TOKEN required")?,
                timeout: Duration::from_secs(parse_or("NOTIFY_TIMEOUT_SECS", 5)?),
                dedup_window: Duration::from_secs(parse_or("NOTIFY_DEDUP_SECS", 60)?),
            },

            wallet_addresses: parse_wallets(&std::env::var("WALLET_ADDRESSES").unwrap_or_default())?,
        };

        config.validate()?;
        Ok(config)
    }

    /// `expires_in` for a [`NewOrder`](crate::models::NewOrder).
    pub fn order_expiry(&self) -> chrono::Duration {
        order_expiry(self.order_expire)
    }

    fn validate(&self) -> Result<()> {
        if self.notify.auth_token.trim().is_empty() {
            bail!("AUTH_TOKEN must not be empty");
        }
        if self.scan.workers == 0 {
            bail!("SCAN_WORKERS must be at least 1");
        }
        if self.scan.interval.is_zero() {
            bail!("SCAN_INTERVAL_SECS must be at least 1");
        }

        for chain in &self.evm {
            if !chain.rpc_url.starts_with("http") {
                bail!("{} RPC URL must be HTTP(S) URL", chain.network);
            }
        }
        if let Some(url) = &self.solana_rpc_url {
            if !url.starts_with("http") {
                bail!("SOLANA_RPC_URL must be HTTP(S) URL");
            }
        }

        tracing::info!(
            evm_chains = self.evm.len(),
            tron = self.tron.is_some(),
            solana = self.solana_rpc_url.is_some(),
            confirmed_mode = self.trade_is_confirmed,
            "Configuration validated"
        );

        Ok(())
    }
}

fn order_expiry(expire: Duration) -> chrono::Duration {
    chrono::Duration::from_std(expire).unwrap_or_else(|_| chrono::Duration::max_value())
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", var)),
        None => Ok(default),
    }
}

/// Parses `trade_type:address[,trade_type:address..]`.
pub fn parse_wallets(raw: &str) -> Result<Vec<WalletAddress>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (trade_type, address) = entry
                .split_once(':')
                .with_context(|| format!("Invalid wallet entry: {}", entry))?;
            let trade_type = TradeType::from_str(trade_type).map_err(anyhow::Error::msg)?;
            if address.trim().is_empty() {
                bail!("Empty address in wallet entry: {}", entry);
            }
            Ok(WalletAddress::enabled(trade_type, address))
        })
        .collect()
}
