/// DexScreener API client for price and market-cap snapshots

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEXSCREENER_API: &str = "https://api.dexscreener.com/latest/dex/tokens";
const API_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct DexScreenerResponse {
    pub pairs: Option<Vec<TokenPair>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "baseToken")]
    pub base_token: Option<BaseToken>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    pub liquidity: Option<Liquidity>,
    pub volume: Option<Volume>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseToken {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub h24: Option<f64>,
}

/// Flattened metrics for one mint, first trading pair wins.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub name: String,
    pub symbol: String,
    pub price_usd: f64,
    pub market_cap: f64,
    pub liquidity_usd: f64,
    pub volume_h24: f64,
}

/// Market-data boundary: one metric fetch per unique mint per tick.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current metrics for a mint, or `None` when no pair trades it.
    async fn snapshot(&self, mint: &str) -> Result<Option<TokenSnapshot>>;
}

pub struct MarketDataClient {
    client: Client,
}

impl MarketDataClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl MarketData for MarketDataClient {
    /// Missing fields default to zero / "Unknown".
    async fn snapshot(&self, mint: &str) -> Result<Option<TokenSnapshot>> {
        let url = format!("{}/{}", DEXSCREENER_API, mint);
        let response: DexScreenerResponse = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?
            .json()
            .await?;

        let Some(pair) = response.pairs.and_then(|pairs| pairs.into_iter().next()) else {
            debug!(mint = mint, "No trading pairs for mint");
            return Ok(None);
        };

        let (name, symbol) = pair
            .base_token
            .map(|t| (t.name, t.symbol))
            .unwrap_or_else(|| ("Unknown".to_string(), "???".to_string()));

        Ok(Some(TokenSnapshot {
            name,
            symbol,
            price_usd: pair
                .price_usd
                .and_then(|p| p.parse().ok())
                .unwrap_or(0.0),
            market_cap: pair.market_cap.unwrap_or(0.0),
            liquidity_usd: pair.liquidity.and_then(|l| l.usd).unwrap_or(0.0),
            volume_h24: pair.volume.and_then(|v| v.h24).unwrap_or(0.0),
        }))
    }
}

/// `$1.25B` / `$3.40M` / `$750.00K`, plain dollars below a thousand.
pub fn format_market_cap(mc: f64) -> String {
    if mc >= 1_000_000_000.0 {
        format!("${:.2}B", mc / 1_000_000_000.0)
    } else if mc >= 1_000_000.0 {
        format!("${:.2}M", mc / 1_000_000.0)
    } else if mc >= 1_000.0 {
        format!("${:.2}K", mc / 1_000.0)
    } else {
        format!("${}", mc)
    }
}
