use crate::{
    chains::{ChainAdapter, ScanUnit, WatchList},
    error::{GatewayError, Result},
    models::{amount, Network, TradeType, Transfer},
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const SPL_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// JSON-RPC codes for slots without a block.
const SLOT_SKIPPED: i64 = -32007;
const NO_BLOCK_FOR_SLOT: i64 = -32009;

const TRACKED_MINTS: [(&str, TradeType); 2] = [
    (USDT_MINT, TradeType::UsdtSolana),
    (USDC_MINT, TradeType::UsdcSolana),
];

/// Decoded SPL-Token `Transfer` (opcode 3) or `TransferChecked` (opcode 12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInstruction {
    pub amount: u64,
    pub decimals: u32,
    pub checked: bool,
}

/// Decodes raw SPL-Token instruction data. Any other opcode or length yields `None`.
pub fn decode_token_instruction(data: &[u8]) -> Option<TokenInstruction> {
    let (checked, decimals) = match (data.first(), data.len()) {
        (Some(3), 9) => (false, 6),
        (Some(12), 10) => (true, u32::from(data[9])),
        _ => return None,
    };
    let amount = u64::from_le_bytes(data[1..9].try_into().ok()?);
    Some(TokenInstruction {
        amount,
        decimals,
        checked,
    })
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmedBlock {
    block_time: Option<i64>,
    #[serde(default)]
    transactions: Vec<BlockTransaction>,
}

#[derive(Debug, Deserialize)]
struct BlockTransaction {
    transaction: TransactionBody,
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Deserialize)]
struct TransactionBody {
    signatures: Vec<String>,
    message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    account_keys: Vec<String>,
    #[serde(default)]
    instructions: Vec<Instruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instruction {
    program_id_index: usize,
    #[serde(default)]
    accounts: Vec<usize>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    err: Option<Value>,
    #[serde(default)]
    loaded_addresses: LoadedAddresses,
    #[serde(default)]
    pre_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    post_token_balances: Vec<TokenBalance>,
    #[serde(default)]
    inner_instructions: Vec<InnerInstructions>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    readonly: Vec<String>,
    #[serde(default)]
    writable: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    account_index: usize,
    mint: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    program_id: String,
}

#[derive(Debug, Deserialize)]
struct InnerInstructions {
    #[serde(default)]
    instructions: Vec<Instruction>,
}

/// Slot scanner decoding SPL-Token instructions out of full blocks.
pub struct SolanaAdapter {
    client: reqwest::Client,
    rpc_url: String,
    watch: WatchList,
}

impl SolanaAdapter {
    pub fn new(client: reqwest::Client, rpc_url: &str) -> Self {
        Self {
            client,
            rpc_url: rpc_url.to_string(),
            watch: WatchList::default(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::UpstreamStatus(response.status().as_u16()));
        }
        let response: RpcResponse<T> = response.json().await?;
        if let Some(error) = response.error {
            return Err(GatewayError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    fn parse_block(&self, slot: u64, block: ConfirmedBlock) -> Vec<Transfer> {
        let timestamp = block
            .block_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or_else(Utc::now);

        block
            .transactions
            .iter()
            .flat_map(|tx| transfers_in(tx, slot, timestamp))
            .filter(|t| self.watch.contains(&t.to_address) || self.watch.contains(&t.from_address))
            .collect()
    }
}

fn transfers_in(tx: &BlockTransaction, slot: u64, timestamp: DateTime<Utc>) -> Vec<Transfer> {
    let Some(meta) = &tx.meta else {
        return Vec::new();
    };
    let message = &tx.transaction.message;

    // Runtime index order: static keys, loaded writable, loaded readonly.
    let keys: Vec<&str> = message
        .account_keys
        .iter()
        .chain(meta.loaded_addresses.writable.iter())
        .chain(meta.loaded_addresses.readonly.iter())
        .map(String::as_str)
        .collect();

    let Some(spl_index) = keys.iter().position(|k| *k == SPL_TOKEN_PROGRAM) else {
        return Vec::new();
    };

    // token account -> (owning wallet, trade type)
    let mut owners: HashMap<&str, (&str, TradeType)> = HashMap::new();
    for balance in meta.post_token_balances.iter().chain(meta.pre_token_balances.iter()) {
        if !balance.program_id.is_empty() && balance.program_id != SPL_TOKEN_PROGRAM {
            continue;
        }
        let Some((_, trade_type)) = TRACKED_MINTS.iter().find(|(mint, _)| *mint == balance.mint) else {
            continue;
        };
        if let Some(account) = keys.get(balance.account_index) {
            owners
                .entry(*account)
                .or_insert((balance.owner.as_str(), *trade_type));
        }
    }
    if owners.is_empty() {
        return Vec::new();
    }

    let tx_hash = tx.transaction.signatures.first().cloned().unwrap_or_default();
    let success = meta.err.is_none();

    message
        .instructions
        .iter()
        .chain(meta.inner_instructions.iter().flat_map(|i| i.instructions.iter()))
        .filter(|ix| ix.program_id_index == spl_index)
        .filter_map(|ix| {
            if ix.accounts.len() < 3 {
                return None;
            }
            let data = bs58::decode(&ix.data).into_vec().ok()?;
            let decoded = decode_token_instruction(&data)?;
            let dst_pos = if decoded.checked { 2 } else { 1 };

            let src = keys.get(*ix.accounts.first()?)?;
            let dst = keys.get(*ix.accounts.get(dst_pos)?)?;
            let (from, trade_type) = owners.get(src)?;
            let (to, dst_type) = owners.get(dst)?;
            if trade_type != dst_type || from.is_empty() || to.is_empty() {
                return None;
            }

            let amount = amount::from_units(u128::from(decoded.amount), decoded.decimals)?;
            if amount.is_zero() {
                return None;
            }

            Some(Transfer {
                network: Network::Solana,
                trade_type: *trade_type,
                tx_hash: tx_hash.clone(),
                from_address: from.to_string(),
                to_address: to.to_string(),
                amount,
                block_num: slot,
                timestamp,
                success,
                confirmed: false,
            })
        })
        .collect()
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn network(&self) -> Network {
        Network::Solana
    }

    fn watch_list(&self) -> &WatchList {
        &self.watch
    }

    async fn fetch_head(&self) -> Result<u64> {
        match self.call::<u64>("getSlot", json!([])).await? {
            Some(slot) if slot > 0 => Ok(slot),
            other => Err(GatewayError::InvalidResponse(format!("invalid slot {:?}", other))),
        }
    }

    async fn fetch_and_parse(&self, unit: &ScanUnit) -> Result<Vec<Transfer>> {
        let ScanUnit::Block(slot) = unit else {
            return Err(GatewayError::InvalidResponse(format!("solana cannot scan {}", unit)));
        };
        let params = json!([
            slot,
            {
                "encoding": "json",
                "maxSupportedTransactionVersion": 0,
                "transactionDetails": "full",
                "rewards": false
            }
        ]);

        match self.call::<ConfirmedBlock>("getBlock", params).await {
            Ok(Some(block)) => Ok(self.parse_block(*slot, block)),
            Ok(None) => Ok(Vec::new()),
            Err(GatewayError::JsonRpc { code, message })
                if code == SLOT_SKIPPED || code == NO_BLOCK_FOR_SLOT =>
            {
                tracing::debug!(slot = *slot, code, "Slot has no block: {}", message);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
