use crate::{
    config::RateConfig,
    error::{GatewayError, Result},
    models::{amount, Asset, RateSnapshot},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How the configured base rate combines with the fetched market price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateRule {
    Market,
    Fixed(Decimal),
    Multiply(Decimal),
    Add(Decimal),
    Subtract(Decimal),
}

impl RateRule {
    /// `""` market, `7.25` fixed, `~f` multiply, `+f` add, `-f` subtract.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return RateRule::Market;
        }

        let (ctor, number): (fn(Decimal) -> RateRule, &str) = match raw.chars().next() {
            Some('~') => (RateRule::Multiply, &raw[1..]),
            Some('+') => (RateRule::Add, &raw[1..]),
            Some('-') => (RateRule::Subtract, &raw[1..]),
            _ => (RateRule::Fixed, raw),
        };

        match Decimal::from_str(number.trim()) {
            Ok(value) => ctor(value),
            Err(_) => {
                tracing::warn!("Unrecognized rate syntax {:?}, using market rate", raw);
                RateRule::Market
            }
        }
    }

    pub fn apply(&self, market: Decimal) -> Decimal {
        let rate = match self {
            RateRule::Market => market,
            RateRule::Fixed(value) => *value,
            RateRule::Multiply(factor) => market * *factor,
            RateRule::Add(delta) => market + *delta,
            RateRule::Subtract(delta) => market - *delta,
        };
        rate.normalize()
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, RateRule::Fixed(_))
    }
}

fn default_rate(asset: Asset) -> Decimal {
    match asset {
        Asset::Usdt | Asset::Usdc => Decimal::new(72, 1),
        Asset::Trx => Decimal::new(18, 1),
    }
}

struct RateEntry {
    rate: Decimal,
    updated_at: Option<DateTime<Utc>>,
}

/// Fiat (CNY) quoting rates per asset.
pub struct RateOracle {
    client: reqwest::Client,
    api_url: String,
    rules: HashMap<Asset, RateRule>,
    rates: RwLock<HashMap<Asset, RateEntry>>,
}

impl RateOracle {
    pub fn new(client: reqwest::Client, config: &RateConfig) -> Self {
        let rules: HashMap<Asset, RateRule> = [
            (Asset::Usdt, RateRule::parse(&config.usdt)),
            (Asset::Usdc, RateRule::parse(&config.usdc)),
            (Asset::Trx, RateRule::parse(&config.trx)),
        ]
        .into_iter()
        .collect();

        let rates = rules
            .iter()
            .map(|(asset, rule)| {
                let rate = match rule {
                    RateRule::Fixed(value) => *value,
                    _ => default_rate(*asset),
                };
                (*asset, RateEntry { rate, updated_at: None })
            })
            .collect();

        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            rules,
            rates: RwLock::new(rates),
        }
    }

    pub async fn rate(&self, asset: Asset) -> Decimal {
        self.rates
            .read()
            .await
            .get(&asset)
            .map(|e| e.rate)
            .unwrap_or_else(|| default_rate(asset))
    }

    pub async fn snapshots(&self) -> Vec<RateSnapshot> {
        let rates = self.rates.read().await;
        Asset::ALL
            .iter()
            .filter_map(|asset| {
                rates.get(asset).map(|e| RateSnapshot {
                    asset: *asset,
                    rate: e.rate,
                    updated_at: e.updated_at,
                })
            })
            .collect()
    }

    /// Fetches the market price and recomputes the rate. On failure the previous rate stays.
    pub async fn refresh(&self, asset: Asset) -> Result<Decimal> {
        let rule = self.rules.get(&asset).copied().unwrap_or(RateRule::Market);
        if rule.is_fixed() {
            return Ok(self.rate(asset).await);
        }

        let market = self.fetch_market(asset).await?;
        let rate = rule.apply(market);
        if rate <= Decimal::ZERO {
            return Err(GatewayError::InvalidResponse(format!(
                "computed {} rate {} is not positive",
                asset, rate
            )));
        }

        self.rates.write().await.insert(
            asset,
            RateEntry {
                rate,
                updated_at: Some(Utc::now()),
            },
        );
        tracing::info!(asset = %asset, market = %market, rate = %rate, "Exchange rate updated");
        Ok(rate)
    }

    async fn fetch_market(&self, asset: Asset) -> Result<Decimal> {
        let t = Utc::now().timestamp_millis().to_string();
        let request = match asset {
            Asset::Trx => self
                .client
                .get(format!(
                    "{}/priapi/v3/growth/convert/currency-pair-market-movement",
                    self.api_url
                ))
                .query(&[
                    ("baseCurrency", "TRX"),
                    ("quoteCurrency", "CNY"),
                    ("bar", "4H"),
                    ("limit", "1"),
                    ("t", t.as_str()),
                ]),
            _ => self
                .client
                .get(format!("{}/v4/c2c/express/price", self.api_url))
                .query(&[
                    ("crypto", asset.symbol()),
                    ("fiat", "CNY"),
                    ("side", "sell"),
                    ("t", t.as_str()),
                ]),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::UpstreamStatus(response.status().as_u16()));
        }
        let body: Value = response.json().await?;
        parse_market_price(asset, &body)
    }

    /// One refresh task per asset, each independent of the others failing.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        Asset::ALL
            .iter()
            .map(|asset| {
                let oracle = self.clone();
                let cancel = cancel.clone();
                let asset = *asset;
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = ticker.tick() => {
                                if let Err(e) = oracle.refresh(asset).await {
                                    tracing::warn!(asset = %asset, "Exchange rate refresh failed: {}", e);
                                }
                            }
                        }
                    }
                    tracing::debug!(asset = %asset, "Rate refresh stopped");
                })
            })
            .collect()
    }
}

fn parse_market_price(asset: Asset, body: &Value) -> Result<Decimal> {
    let error_code = match body.get("error_code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(-1),
        _ => 0,
    };
    if error_code != 0 {
        return Err(GatewayError::InvalidResponse(format!(
            "quote source error_code {}",
            error_code
        )));
    }

    let price = match asset {
        Asset::Trx => body.pointer("/data/datapointList/0/price"),
        _ => body.pointer("/data/price"),
    };
    let price = match price {
        Some(Value::String(s)) => amount::parse(s),
        Some(Value::Number(n)) => amount::parse(&n.to_string()),
        _ => None,
    }
    .ok_or_else(|| GatewayError::InvalidResponse(format!("no {} price in response", asset)))?;

    if price <= Decimal::ZERO {
        return Err(GatewayError::InvalidResponse(format!(
            "{} price {} is not positive",
            asset, price
        )));
    }
    Ok(price)
}
