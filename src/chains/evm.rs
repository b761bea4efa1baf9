use crate::{
    chains::{ChainAdapter, ScanUnit, WatchList},
    error::{GatewayError, Result},
    models::{amount, EvmToken, Network, Transfer},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, Filter, Log, ValueOrArray, H256, U256},
};
use std::sync::Arc;

// ERC-20 Transfer event
abigen!(
    IERC20Events,
    r#"[
        event Transfer(address indexed from, address indexed to, uint256 value)
    ]"#
);

/// Block scanner for one EVM network, reading `Transfer` logs of the configured stablecoin
/// contracts.
pub struct EvmAdapter {
    network: Network,
    provider: Arc<Provider<Http>>,
    tokens: Vec<(Address, EvmToken)>,
    watch: WatchList,
}

impl EvmAdapter {
    pub fn new(network: Network, rpc_url: &str) -> anyhow::Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url)?);
        let tokens = network
            .evm_tokens()
            .iter()
            .map(|token| Ok((token.contract.parse::<Address>()?, *token)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        tracing::info!(network = %network, tokens = tokens.len(), "EVM adapter ready");
        Ok(Self {
            network,
            provider,
            tokens,
            watch: WatchList::default(),
        })
    }

    fn token_for(&self, contract: Address) -> Option<&EvmToken> {
        self.tokens
            .iter()
            .find(|(address, _)| *address == contract)
            .map(|(_, token)| token)
    }

    async fn block_time(&self, number: u64) -> Result<DateTime<Utc>> {
        let block = self
            .provider
            .get_block(number)
            .await?
            .ok_or_else(|| GatewayError::InvalidResponse(format!("block {} not found", number)))?;
        block_timestamp(block.timestamp)
    }

    /// Decodes Transfer logs into transfers to watched recipients.
    pub fn transfers_from_logs(
        &self,
        logs: &[Log],
        block: u64,
        timestamp: DateTime<Utc>,
    ) -> Vec<Transfer> {
        logs.iter()
            .filter(|log| log.removed != Some(true))
            .filter_map(|log| {
                let token = self.token_for(log.address)?;
                let event = match ethers::contract::parse_log::<TransferFilter>(log.clone()) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(network = %self.network, "Undecodable Transfer log: {}", e);
                        return None;
                    }
                };

                let to = self.network.normalize_address(&format!("{:?}", event.to));
                if !self.watch.contains(&to) {
                    return None;
                }
                let value = units_u128(event.value)?;
                let amount = amount::from_units(value, token.decimals)?;
                if amount.is_zero() {
                    return None;
                }

                Some(Transfer {
                    network: self.network,
                    trade_type: token.trade_type,
                    tx_hash: log
                        .transaction_hash
                        .map(|h| format!("{:?}", h))
                        .unwrap_or_default(),
                    from_address: self.network.normalize_address(&format!("{:?}", event.from)),
                    to_address: to,
                    amount,
                    block_num: log.block_number.map(|n| n.as_u64()).unwrap_or(block),
                    timestamp,
                    // Reverted transactions emit no logs.
                    success: true,
                    confirmed: false,
                })
            })
            .collect()
    }
}

fn block_timestamp(raw: U256) -> Result<DateTime<Utc>> {
    if raw > U256::from(i64::MAX as u64) {
        return Err(GatewayError::InvalidResponse(format!("bad timestamp {}", raw)));
    }
    let secs = raw.as_u64() as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("bad timestamp {}", secs)))
}

fn units_u128(value: U256) -> Option<u128> {
    if value > U256::from(u128::MAX) {
        return None;
    }
    Some(value.as_u128())
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn network(&self) -> Network {
        self.network
    }

    fn watch_list(&self) -> &WatchList {
        &self.watch
    }

    async fn fetch_head(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn fetch_and_parse(&self, unit: &ScanUnit) -> Result<Vec<Transfer>> {
        let ScanUnit::Block(number) = unit else {
            return Err(GatewayError::InvalidResponse(format!(
                "{} cannot scan {}",
                self.network, unit
            )));
        };
        let number = *number;
        let recipients = self.watch.snapshot();
        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let recipients: Vec<Option<H256>> = recipients
            .iter()
            .filter_map(|a| a.parse::<Address>().ok())
            .map(|a| Some(H256::from(a)))
            .collect();
        let contracts: Vec<Address> = self.tokens.iter().map(|(address, _)| *address).collect();

        let filter = Filter::new()
            .from_block(number)
            .to_block(number)
            .address(contracts)
            .event("Transfer(address,address,uint256)")
            .topic2(ValueOrArray::Array(recipients));

        let logs = self.provider.get_logs(&filter).await?;
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let timestamp = self.block_time(number).await?;
        Ok(self.transfers_from_logs(&logs, number, timestamp))
    }
}
