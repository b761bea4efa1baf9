use crate::{
    chains::{ChainAdapter, ScanMode, ScanUnit, WatchList},
    config::TronConfig,
    error::{GatewayError, Result},
    models::{amount, Network, TradeType, Transfer},
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

pub const USDT_TRC20_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchTransfer>,
}

#[derive(Debug, Deserialize)]
struct SearchTransfer {
    amount: Value,
    to_address: String,
    from_address: String,
    hash: String,
    #[serde(rename = "contractRet", default)]
    contract_ret: String,
    #[serde(default)]
    confirmed: bool,
    date_created: i64,
}

/// Polls the transaction search index per monitored address instead of walking blocks.
pub struct TronAdapter {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    watch: WatchList,
}

impl TronAdapter {
    pub fn new(client: reqwest::Client, config: &TronConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            watch: WatchList::default(),
        }
    }

    fn to_transfer(&self, raw: SearchTransfer) -> Option<Transfer> {
        let units = match &raw.amount {
            Value::String(s) => amount::parse(s),
            Value::Number(n) => amount::parse(&n.to_string()),
            _ => None,
        }?;
        let amount = (units / Decimal::from(1_000_000u32)).normalize();
        if amount.is_zero() {
            return None;
        }
        let timestamp = Utc.timestamp_millis_opt(raw.date_created).single()?;

        Some(Transfer {
            network: Network::Tron,
            trade_type: TradeType::UsdtTrc20,
            tx_hash: raw.hash,
            from_address: raw.from_address,
            to_address: raw.to_address,
            amount,
            block_num: 0,
            timestamp,
            success: raw.contract_ret == "SUCCESS",
            confirmed: raw.confirmed,
        })
    }
}

#[async_trait]
impl ChainAdapter for TronAdapter {
    fn network(&self) -> Network {
        Network::Tron
    }

    fn scan_mode(&self) -> ScanMode {
        ScanMode::AddressWindows
    }

    fn watch_list(&self) -> &WatchList {
        &self.watch
    }

    async fn fetch_head(&self) -> Result<u64> {
        Ok(u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default())
    }

    async fn fetch_and_parse(&self, unit: &ScanUnit) -> Result<Vec<Transfer>> {
        let ScanUnit::Window {
            address,
            start,
            end,
        } = unit
        else {
            return Err(GatewayError::InvalidResponse(format!("tron cannot scan {}", unit)));
        };

        let start = start.timestamp_millis().to_string();
        let end = end.timestamp_millis().to_string();
        let mut request = self
            .client
            .get(format!("{}/api/multi/search", self.api_url))
            .query(&[
                ("limit", "50"),
                ("start", "0"),
                ("type", "transfer"),
                ("secondType", "20"),
                ("start_timestamp", start.as_str()),
                ("end_timestamp", end.as_str()),
                ("toAddress", address.as_str()),
                ("fromAddress", address.as_str()),
                ("token", USDT_TRC20_CONTRACT),
                ("relation", "or"),
            ]);
        if let Some(key) = &self.api_key {
            request = request.header("TRON-PRO-API-KEY", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::UpstreamStatus(response.status().as_u16()));
        }
        let body: SearchResponse = response.json().await?;
        tracing::debug!(address = %address, total = body.data.len(), "Tron search window");

        Ok(body
            .data
            .into_iter()
            .filter_map(|raw| self.to_transfer(raw))
            .collect())
    }
}
