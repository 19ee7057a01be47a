/// Helius enhanced-transactions client for recent token transfer activity

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const HELIUS_API: &str = "https://api.helius.xyz/v0/addresses";
const TRANSACTION_LIMIT: u32 = 20;
const API_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancedTransaction {
    pub signature: String,
    #[serde(rename = "tokenTransfers", default)]
    pub token_transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenTransfer {
    pub mint: Option<String>,
    #[serde(rename = "fromUserAccount")]
    pub from_user_account: Option<String>,
    #[serde(rename = "toUserAccount")]
    pub to_user_account: Option<String>,
    #[serde(rename = "tokenAmount")]
    pub token_amount: Option<f64>,
}

/// One token transfer flattened out of an enhanced transaction.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub signature: String,
    pub mint: String,
    pub from_wallet: Option<String>,
    pub to_wallet: Option<String>,
    pub amount: f64,
}

/// Transfer-activity boundary for the whale loop.
#[async_trait]
pub trait TransferFeed: Send + Sync {
    async fn recent_transfers(&self, mint: &str) -> Result<Vec<TransferRecord>>;
}

pub struct TransferClient {
    client: Client,
    api_key: String,
}

impl TransferClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl TransferFeed for TransferClient {
    /// Recent transfers referencing the given mint, flattened across the
    /// last [`TRANSACTION_LIMIT`] transactions touching its address.
    async fn recent_transfers(&self, mint: &str) -> Result<Vec<TransferRecord>> {
        let url = format!(
            "{}/{}/transactions?api-key={}&limit={}",
            HELIUS_API, mint, self.api_key, TRANSACTION_LIMIT
        );

        let transactions: Vec<EnhancedTransaction> = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?
            .json()
            .await?;

        let records = flatten_transfers(transactions, mint);
        debug!(mint = mint, count = records.len(), "Fetched recent transfers");
        Ok(records)
    }
}

/// Keeps only transfers of the watched mint; other legs of the same
/// transaction are ignored.
fn flatten_transfers(
    transactions: Vec<EnhancedTransaction>,
    mint: &str,
) -> Vec<TransferRecord> {
    let mut records = Vec::new();
    for tx in transactions {
        for transfer in tx.token_transfers {
            if transfer.mint.as_deref() != Some(mint) {
                continue;
            }
            records.push(TransferRecord {
                signature: tx.signature.clone(),
                mint: mint.to_string(),
                from_wallet: transfer.from_user_account.filter(|w| !w.is_empty()),
                to_wallet: transfer.to_user_account.filter(|w| !w.is_empty()),
                amount: transfer.token_amount.unwrap_or(0.0),
            });
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_keeps_only_watched_mint() {
        let raw = r#"[
            {"signature":"sig1","tokenTransfers":[
                {"mint":"MintA","fromUserAccount":"w1","toUserAccount":"w2","tokenAmount":100.0},
                {"mint":"MintB","fromUserAccount":"w1","toUserAccount":"w2","tokenAmount":5.0}
            ]},
            {"signature":"sig2","tokenTransfers":[
                {"mint":"MintA","fromUserAccount":"","toUserAccount":"w3","tokenAmount":50.0}
            ]},
            {"signature":"sig3"}
        ]"#;
        let transactions: Vec<EnhancedTransaction> = serde_json::from_str(raw).unwrap();

        let records = flatten_transfers(transactions, "MintA");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].signature, "sig1");
        assert_eq!(records[0].from_wallet.as_deref(), Some("w1"));
        // Empty from-side normalizes to None, marking a buy.
        assert_eq!(records[1].signature, "sig2");
        assert!(records[1].from_wallet.is_none());
        assert_eq!(records[1].to_wallet.as_deref(), Some("w3"));
    }

    #[test]
    fn test_missing_amount_defaults_to_zero() {
        let raw = r#"[{"signature":"sig1","tokenTransfers":[{"mint":"MintA"}]}]"#;
        let transactions: Vec<EnhancedTransaction> = serde_json::from_str(raw).unwrap();
        let records = flatten_transfers(transactions, "MintA");
        assert_eq!(records[0].amount, 0.0);
    }
}
