use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tron,
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Base,
    Xlayer,
    Solana,
}

/// Cursor tuning for block/slot scanned networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanDefaults {
    pub confirmation_offset: u64,
    /// Negative: how far behind the first observed head the backfill reaches.
    pub backfill_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmToken {
    pub contract: &'static str,
    pub decimals: u32,
    pub trade_type: TradeType,
}

impl Network {
    pub const EVM: [Network; 6] = [
        Network::Ethereum,
        Network::Bsc,
        Network::Polygon,
        Network::Arbitrum,
        Network::Base,
        Network::Xlayer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tron => "tron",
            Network::Ethereum => "ethereum",
            Network::Bsc => "bsc",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
            Network::Base => "base",
            Network::Xlayer => "xlayer",
            Network::Solana => "solana",
        }
    }

    pub fn is_evm(&self) -> bool {
        Self::EVM.contains(self)
    }

    /// EVM addresses compare case-insensitively; base58 addresses are case-sensitive.
    pub fn normalize_address(&self, address: &str) -> String {
        let trimmed = address.trim();
        if self.is_evm() {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    }

    pub fn scan_defaults(&self) -> ScanDefaults {
        let (confirmation_offset, backfill_offset) = match self {
            Network::Tron => (0, 0),
            Network::Ethereum => (12, -100),
            Network::Bsc => (15, -400),
            Network::Polygon => (40, -600),
            Network::Arbitrum => (40, -600),
            Network::Base => (20, -400),
            Network::Xlayer => (20, -400),
            Network::Solana => (60, -600),
        };
        ScanDefaults {
            confirmation_offset,
            backfill_offset,
        }
    }

    pub fn evm_tokens(&self) -> &'static [EvmToken] {
        match self {
            Network::Ethereum => &[
                EvmToken {
                    contract: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                    decimals: 6,
                    trade_type: TradeType::UsdtErc20,
                },
                EvmToken {
                    contract: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                    decimals: 6,
                    trade_type: TradeType::UsdcErc20,
                },
            ],
            Network::Bsc => &[
                EvmToken {
                    contract: "0x55d398326f99059fF775485246999027B3197955",
                    decimals: 18,
                    trade_type: TradeType::UsdtBep20,
                },
                EvmToken {
                    contract: "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
                    decimals: 18,
                    trade_type: TradeType::UsdcBep20,
                },
            ],
            Network::Polygon => &[
                EvmToken {
                    contract: "0xc2132D05D31c914a87C6611C10748AEb04B58e8F",
                    decimals: 6,
                    trade_type: TradeType::UsdtPolygon,
                },
                EvmToken {
                    contract: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
                    decimals: 6,
                    trade_type: TradeType::UsdcPolygon,
                },
            ],
            Network::Arbitrum => &[
                EvmToken {
                    contract: "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9",
                    decimals: 6,
                    trade_type: TradeType::UsdtArbitrum,
                },
                EvmToken {
                    contract: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831",
                    decimals: 6,
                    trade_type: TradeType::UsdcArbitrum,
                },
            ],
            Network::Base => &[
                EvmToken {
                    contract: "0xfde4C96c8593536E31F229EA8f37b2ADa2699bb2",
                    decimals: 6,
                    trade_type: TradeType::UsdtBase,
                },
                EvmToken {
                    contract: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                    decimals: 6,
                    trade_type: TradeType::UsdcBase,
                },
            ],
            Network::Xlayer => &[
                EvmToken {
                    contract: "0x1E4a5963aBFD975d8c9021ce480b42188849D41d",
                    decimals: 6,
                    trade_type: TradeType::UsdtXlayer,
                },
                EvmToken {
                    contract: "0x74b7F16337b8972027F6196A17a631aC6dE26d22",
                    decimals: 6,
                    trade_type: TradeType::UsdcXlayer,
                },
            ],
            Network::Tron | Network::Solana => &[],
        }
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        let base = match self {
            Network::Tron => "https://tronscan.org/#/transaction/",
            Network::Ethereum => "https://etherscan.io/tx/",
            Network::Bsc => "https://bscscan.com/tx/",
            Network::Polygon => "https://polygonscan.com/tx/",
            Network::Arbitrum => "https://arbiscan.io/tx/",
            Network::Base => "https://basescan.org/tx/",
            Network::Xlayer => "https://www.oklink.com/xlayer/tx/",
            Network::Solana => "https://solscan.io/tx/",
        };
        format!("{}{}", base, tx_hash)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Usdt,
    Usdc,
    Trx,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Usdt, Asset::Usdc, Asset::Trx];

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Usdt => "USDT",
            Asset::Usdc => "USDC",
            Asset::Trx => "TRX",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Chain/asset pair an order is quoted in, rendered as `asset.network` (e.g. `usdt.trc20`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TradeType {
    UsdtTrc20,
    UsdtErc20,
    UsdtBep20,
    UsdtPolygon,
    UsdtArbitrum,
    UsdtBase,
    UsdtXlayer,
    UsdtSolana,
    UsdcErc20,
    UsdcBep20,
    UsdcPolygon,
    UsdcArbitrum,
    UsdcBase,
    UsdcXlayer,
    UsdcSolana,
    TronTrx,
}

impl TradeType {
    pub const ALL: [TradeType; 16] = [
        TradeType::UsdtTrc20,
        TradeType::UsdtErc20,
        TradeType::UsdtBep20,
        TradeType::UsdtPolygon,
        TradeType::UsdtArbitrum,
        TradeType::UsdtBase,
        TradeType::UsdtXlayer,
        TradeType::UsdtSolana,
        TradeType::UsdcErc20,
        TradeType::UsdcBep20,
        TradeType::UsdcPolygon,
        TradeType::UsdcArbitrum,
        TradeType::UsdcBase,
        TradeType::UsdcXlayer,
        TradeType::UsdcSolana,
        TradeType::TronTrx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::UsdtTrc20 => "usdt.trc20",
            TradeType::UsdtErc20 => "usdt.erc20",
            TradeType::UsdtBep20 => "usdt.bep20",
            TradeType::UsdtPolygon => "usdt.polygon",
            TradeType::UsdtArbitrum => "usdt.arbitrum",
            TradeType::UsdtBase => "usdt.base",
            TradeType::UsdtXlayer => "usdt.xlayer",
            TradeType::UsdtSolana => "usdt.solana",
            TradeType::UsdcErc20 => "usdc.erc20",
            TradeType::UsdcBep20 => "usdc.bep20",
            TradeType::UsdcPolygon => "usdc.polygon",
            TradeType::UsdcArbitrum => "usdc.arbitrum",
            TradeType::UsdcBase => "usdc.base",
            TradeType::UsdcXlayer => "usdc.xlayer",
            TradeType::UsdcSolana => "usdc.solana",
            TradeType::TronTrx => "tron.trx",
        }
    }

    pub fn network(&self) -> Network {
        match self {
            TradeType::UsdtTrc20 | TradeType::TronTrx => Network::Tron,
            TradeType::UsdtErc20 | TradeType::UsdcErc20 => Network::Ethereum,
            TradeType::UsdtBep20 | TradeType::UsdcBep20 => Network::Bsc,
            TradeType::UsdtPolygon | TradeType::UsdcPolygon => Network::Polygon,
            TradeType::UsdtArbitrum | TradeType::UsdcArbitrum => Network::Arbitrum,
            TradeType::UsdtBase | TradeType::UsdcBase => Network::Base,
            TradeType::UsdtXlayer | TradeType::UsdcXlayer => Network::Xlayer,
            TradeType::UsdtSolana | TradeType::UsdcSolana => Network::Solana,
        }
    }

    pub fn asset(&self) -> Asset {
        match self {
            TradeType::TronTrx => Asset::Trx,
            TradeType::UsdcErc20
            | TradeType::UsdcBep20
            | TradeType::UsdcPolygon
            | TradeType::UsdcArbitrum
            | TradeType::UsdcBase
            | TradeType::UsdcXlayer
            | TradeType::UsdcSolana => Asset::Usdc,
            _ => Asset::Usdt,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|t| t.as_str() == wanted)
            .copied()
            .ok_or_else(|| format!("unknown trade type: {}", s))
    }
}

impl TryFrom<String> for TradeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradeType> for String {
    fn from(value: TradeType) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_type_parses_dotted_form() {
        assert_eq!("usdt.trc20".parse::<TradeType>(), Ok(TradeType::UsdtTrc20));
        assert_eq!(" USDC.Polygon ".parse::<TradeType>(), Ok(TradeType::UsdcPolygon));
        assert!("usdt.dogechain".parse::<TradeType>().is_err());
    }

    #[test]
    fn every_evm_token_maps_back_to_its_network() {
        for network in Network::EVM {
            for token in network.evm_tokens() {
                assert_eq!(token.trade_type.network(), network);
            }
        }
    }

    #[test]
    fn evm_addresses_are_case_folded() {
        let addr = "0xAbCd00000000000000000000000000000000Ef01";
        assert_eq!(
            Network::Polygon.normalize_address(addr),
            "0xabcd00000000000000000000000000000000ef01"
        );
        assert_eq!(Network::Tron.normalize_address(" TXyz "), "TXyz");
    }
}
