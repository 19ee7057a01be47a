//! Whale worker: large transfers of watchlist mints, deduplicated by
//! transaction signature.

use crate::delivery::{whale_message, OutputChannel, SEND_PACING};
use crate::market::{MarketData, TokenSnapshot};
use crate::scheduler::Worker;
use crate::store::Store;
use crate::transfers::{TransferFeed, TransferRecord};
use crate::types::{SourceType, TransferSide, WhaleMove};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct WhaleWorker {
    store: Store,
    transfers: Arc<dyn TransferFeed>,
    market: Arc<dyn MarketData>,
    sink: Arc<dyn OutputChannel>,
    webhook: Option<String>,
    threshold_usd: f64,
}

impl WhaleWorker {
    pub fn new(
        store: Store,
        transfers: Arc<dyn TransferFeed>,
        market: Arc<dyn MarketData>,
        sink: Arc<dyn OutputChannel>,
        webhook: Option<String>,
        threshold_usd: f64,
    ) -> Self {
        Self {
            store,
            transfers,
            market,
            sink,
            webhook,
            threshold_usd,
        }
    }

    async fn process_mint(
        &self,
        webhook: &str,
        mint: &str,
    ) -> Result<usize> {
        let records = self.transfers.recent_transfers(mint).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let snapshot = match self.market.snapshot(mint).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(mint = mint, error = %e, "Market snapshot failed, price defaults to zero");
                None
            }
        };
        let unit_price = snapshot.as_ref().map(|s| s.price_usd).unwrap_or(0.0);

        let mut delivered = 0;
        for record in records {
            let Some(whale) = classify_whale(&record, unit_price, self.threshold_usd) else {
                continue;
            };

            // One signature lookup per candidate, then record-then-send.
            if self.store.signature_seen(&record.signature).await? {
                continue;
            }

            info!(
                mint = mint,
                signature = %record.signature,
                usd_value = whale.usd_value,
                side = ?whale.side,
                "🐋 Whale move detected"
            );

            if let Err(e) = self.store.record_whale_move(&record.signature, &whale).await {
                warn!(
                    signature = %record.signature,
                    error = %e,
                    "Failed to record whale move, delivering anyway"
                );
            }

            let message = whale_message(&whale, snapshot.as_ref(), &record.signature);
            if let Err(e) = self.sink.send(webhook, &message).await {
                warn!(signature = %record.signature, error = %e, "Whale delivery failed");
            } else {
                delivered += 1;
            }
            sleep(SEND_PACING).await;
        }
        Ok(delivered)
    }
}

/// USD-values a transfer and classifies it when it crosses the floor.
/// A populated from-side is a sell from that wallet; otherwise it is a buy
/// into the to-wallet.
pub fn classify_whale(
    record: &TransferRecord,
    unit_price: f64,
    threshold_usd: f64,
) -> Option<WhaleMove> {
    let usd_value = record.amount * unit_price;
    if usd_value < threshold_usd {
        return None;
    }

    let (side, wallet) = match &record.from_wallet {
        Some(from) => (TransferSide::Sell, from.clone()),
        None => (
            TransferSide::Buy,
            record.to_wallet.clone().unwrap_or_else(|| "Unknown".to_string()),
        ),
    };

    Some(WhaleMove {
        mint: record.mint.clone(),
        wallet,
        amount: record.amount,
        usd_value,
        side,
    })
}

#[async_trait]
impl Worker for WhaleWorker {
    fn name(&self) -> &'static str {
        "whale"
    }

    async fn tick(&self) -> Result<()> {
        let Some(webhook) = self.webhook.clone() else {
            warn!("Whale-moves webhook not configured, skipping tick");
            return Ok(());
        };

        let tracked = self.store.tracked(SourceType::Whale).await?;
        if tracked.is_empty() {
            info!("No watchlist mints to monitor for whales");
            return Ok(());
        }

        let mut seen_mints = HashSet::new();
        let mints: Vec<String> = tracked
            .iter()
            .map(|e| e.key.clone())
            .filter(|m| seen_mints.insert(m.clone()))
            .collect();
        info!(mints = mints.len(), "Monitoring mints for whale activity");

        for mint in mints {
            if let Err(e) = self.process_mint(&webhook, &mint).await {
                warn!(mint = %mint, error = %e, "Failed to check whale moves");
            }
            sleep(std::time::Duration::from_secs(1)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::AlertMessage;
    use crate::types::TrackedEntity;
    use chrono::Utc;
    use std::sync::Mutex;

    struct CannedTransfers {
        records: Vec<TransferRecord>,
    }

    #[async_trait]
    impl TransferFeed for CannedTransfers {
        async fn recent_transfers(&self, _mint: &str) -> Result<Vec<TransferRecord>> {
            Ok(self.records.clone())
        }
    }

    struct FixedPrice(f64);

    #[async_trait]
    impl MarketData for FixedPrice {
        async fn snapshot(&self, _mint: &str) -> Result<Option<TokenSnapshot>> {
            Ok(Some(TokenSnapshot {
                name: "Token".to_string(),
                symbol: "TOK".to_string(),
                price_usd: self.0,
                market_cap: 0.0,
                liquidity_usd: 0.0,
                volume_h24: 0.0,
            }))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<AlertMessage>>,
    }

    #[async_trait]
    impl OutputChannel for RecordingSink {
        async fn send(&self, _webhook_url: &str, message: &AlertMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn record(signature: &str, amount: f64, from: Option<&str>, to: Option<&str>) -> TransferRecord {
        TransferRecord {
            signature: signature.to_string(),
            mint: "MintA".to_string(),
            from_wallet: from.map(String::from),
            to_wallet: to.map(String::from),
            amount,
        }
    }

    #[test]
    fn test_classification_sides() {
        let sell = classify_whale(&record("s", 20_000.0, Some("w1"), Some("w2")), 1.0, 10_000.0)
            .unwrap();
        assert_eq!(sell.side, TransferSide::Sell);
        assert_eq!(sell.wallet, "w1");

        let buy = classify_whale(&record("s", 20_000.0, None, Some("w2")), 1.0, 10_000.0).unwrap();
        assert_eq!(buy.side, TransferSide::Buy);
        assert_eq!(buy.wallet, "w2");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(classify_whale(&record("s", 10_000.0, None, None), 1.0, 10_000.0).is_some());
        assert!(classify_whale(&record("s", 9_999.0, None, None), 1.0, 10_000.0).is_none());
    }

    #[test]
    fn test_zero_price_never_crosses_the_floor() {
        assert!(classify_whale(&record("s", 1e12, None, None), 0.0, 10_000.0).is_none());
    }

    async fn setup(
        records: Vec<TransferRecord>,
        price: f64,
    ) -> (Store, Arc<RecordingSink>, WhaleWorker) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .track(&TrackedEntity {
                source_type: SourceType::Whale,
                key: "MintA".to_string(),
                subscriber_id: "u1".to_string(),
                watermark: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let worker = WhaleWorker::new(
            store.clone(),
            Arc::new(CannedTransfers { records }),
            Arc::new(FixedPrice(price)),
            Arc::clone(&sink) as Arc<dyn OutputChannel>,
            Some("http://hook".to_string()),
            10_000.0,
        );
        (store, sink, worker)
    }

    #[tokio::test]
    async fn test_same_signature_is_delivered_at_most_once() {
        let records = vec![record("sig1", 50_000.0, Some("w1"), Some("w2"))];
        let (store, sink, worker) = setup(records, 1.0).await;

        worker.tick().await.unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 1);

        // Second tick sees the same feed; nothing goes out for sig1.
        worker.tick().await.unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert!(store.signature_seen("sig1").await.unwrap());
    }

    #[tokio::test]
    async fn test_small_transfers_are_ignored() {
        let records = vec![record("sig1", 100.0, Some("w1"), Some("w2"))];
        let (store, sink, worker) = setup(records, 1.0).await;

        worker.tick().await.unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
        assert!(!store.signature_seen("sig1").await.unwrap());
    }

    #[tokio::test]
    async fn test_mixed_batch_delivers_only_whales() {
        let records = vec![
            record("sig1", 100.0, Some("w1"), Some("w2")),
            record("sig2", 30_000.0, None, Some("w3")),
            record("sig3", 15_000.0, Some("w4"), None),
        ];
        let (store, sink, worker) = setup(records, 1.0).await;

        worker.tick().await.unwrap();

        assert_eq!(sink.sent.lock().unwrap().len(), 2);
        assert!(store.signature_seen("sig2").await.unwrap());
        assert!(store.signature_seen("sig3").await.unwrap());
        assert!(!store.signature_seen("sig1").await.unwrap());
    }
}
