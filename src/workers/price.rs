//! Price alert worker: one-shot market-cap thresholds on watchlist mints.

use crate::delivery::{price_alert_message, OutputChannel, SEND_PACING};
use crate::market::{format_market_cap, MarketData};
use crate::scheduler::Worker;
use crate::store::Store;
use crate::types::{AlertDirection, PriceAlert};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

pub struct PriceWorker {
    store: Store,
    market: Arc<dyn MarketData>,
    sink: Arc<dyn OutputChannel>,
    webhook: Option<String>,
}

impl PriceWorker {
    pub fn new(
        store: Store,
        market: Arc<dyn MarketData>,
        sink: Arc<dyn OutputChannel>,
        webhook: Option<String>,
    ) -> Self {
        Self {
            store,
            market,
            sink,
            webhook,
        }
    }
}

/// Boundary-inclusive threshold check, both directions.
pub fn alert_fires(alert: &PriceAlert, market_cap: f64) -> bool {
    match alert.direction {
        AlertDirection::Above => market_cap >= alert.threshold_usd,
        AlertDirection::Below => market_cap <= alert.threshold_usd,
    }
}

#[async_trait]
impl Worker for PriceWorker {
    fn name(&self) -> &'static str {
        "price_alert"
    }

    async fn tick(&self) -> Result<()> {
        let Some(webhook) = self.webhook.clone() else {
            warn!("Price-alerts webhook not configured, skipping tick");
            return Ok(());
        };

        let alerts = self.store.active_alerts().await?;
        if alerts.is_empty() {
            info!("No active price alerts");
            return Ok(());
        }
        info!(count = alerts.len(), "Checking price alerts");

        // One metric fetch per unique mint, never one per alert.
        let mut seen_mints = HashSet::new();
        let mints: Vec<String> = alerts
            .iter()
            .map(|a| a.mint.clone())
            .filter(|m| seen_mints.insert(m.clone()))
            .collect();

        for mint in mints {
            let snapshot = match self.market.snapshot(&mint).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    info!(mint = %mint, "No price data for mint");
                    continue;
                }
                Err(e) => {
                    warn!(mint = %mint, error = %e, "Market snapshot failed");
                    continue;
                }
            };

            info!(
                symbol = %snapshot.symbol,
                market_cap = %format_market_cap(snapshot.market_cap),
                "Fetched metrics"
            );

            for alert in alerts.iter().filter(|a| a.mint == mint) {
                if !alert_fires(alert, snapshot.market_cap) {
                    continue;
                }

                info!(
                    alert_id = alert.id,
                    mint = %mint,
                    direction = alert.direction.as_str(),
                    threshold = %format_market_cap(alert.threshold_usd),
                    "🚨 Alert triggered"
                );

                // Trip before sending so an oscillating metric can never
                // fire the same alert twice. A failed trip still delivers;
                // a rare duplicate beats a lost alert.
                if let Err(e) = self.store.trip_alert(alert.id).await {
                    warn!(alert_id = alert.id, error = %e, "Failed to trip alert, delivering anyway");
                }

                let message = price_alert_message(alert, &snapshot);
                if let Err(e) = self.sink.send(&webhook, &message).await {
                    warn!(alert_id = alert.id, error = %e, "Alert delivery failed");
                }
                sleep(SEND_PACING).await;
            }

            sleep(std::time::Duration::from_millis(500)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::AlertMessage;
    use crate::market::TokenSnapshot;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedMarket {
        caps: HashMap<String, f64>,
        calls: AtomicUsize,
    }

    impl FixedMarket {
        fn new(caps: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                caps: caps
                    .iter()
                    .map(|(m, c)| (m.to_string(), *c))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MarketData for FixedMarket {
        async fn snapshot(&self, mint: &str) -> Result<Option<TokenSnapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.caps.get(mint).map(|&market_cap| TokenSnapshot {
                name: "Token".to_string(),
                symbol: "TOK".to_string(),
                price_usd: 0.001,
                market_cap,
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

    fn alert(direction: AlertDirection, threshold: f64) -> PriceAlert {
        PriceAlert {
            id: 1,
            subscriber_id: "u1".to_string(),
            mint: "MintA".to_string(),
            direction,
            threshold_usd: threshold,
        }
    }

    #[test]
    fn test_threshold_is_boundary_inclusive_both_directions() {
        assert!(alert_fires(&alert(AlertDirection::Above, 1000.0), 1000.0));
        assert!(alert_fires(&alert(AlertDirection::Below, 1000.0), 1000.0));
        assert!(alert_fires(&alert(AlertDirection::Above, 1000.0), 1500.0));
        assert!(!alert_fires(&alert(AlertDirection::Above, 1000.0), 999.0));
        assert!(alert_fires(&alert(AlertDirection::Below, 1000.0), 500.0));
        assert!(!alert_fires(&alert(AlertDirection::Below, 1000.0), 1001.0));
    }

    async fn setup(
        caps: &[(&str, f64)],
    ) -> (Store, Arc<FixedMarket>, Arc<RecordingSink>, PriceWorker) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let market = FixedMarket::new(caps);
        let sink = Arc::new(RecordingSink::default());
        let worker = PriceWorker::new(
            store.clone(),
            Arc::clone(&market) as Arc<dyn MarketData>,
            Arc::clone(&sink) as Arc<dyn OutputChannel>,
            Some("http://hook".to_string()),
        );
        (store, market, sink, worker)
    }

    #[tokio::test]
    async fn test_tripped_alert_never_fires_again() {
        let (store, _market, sink, worker) = setup(&[("MintA", 2_000_000.0)]).await;
        store
            .add_alert("u1", "MintA", AlertDirection::Above, 1_000_000.0)
            .await
            .unwrap();

        worker.tick().await.unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 1);

        // Metric oscillates around the threshold on later ticks.
        worker.tick().await.unwrap();
        worker.tick().await.unwrap();
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
        assert!(store.active_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_fetch_per_unique_mint() {
        let (store, market, sink, worker) = setup(&[("MintA", 500.0)]).await;
        // Three alerts on the same mint, none of which fire.
        for subscriber in ["u1", "u2", "u3"] {
            store
                .add_alert(subscriber, "MintA", AlertDirection::Above, 1_000_000.0)
                .await
                .unwrap();
        }

        worker.tick().await.unwrap();

        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_alert_evaluated_independently() {
        let (store, _market, sink, worker) = setup(&[("MintA", 1_000_000.0)]).await;
        store
            .add_alert("u1", "MintA", AlertDirection::Above, 1_000_000.0)
            .await
            .unwrap();
        store
            .add_alert("u2", "MintA", AlertDirection::Below, 1_000_000.0)
            .await
            .unwrap();
        store
            .add_alert("u3", "MintA", AlertDirection::Above, 9_000_000.0)
            .await
            .unwrap();

        worker.tick().await.unwrap();

        // Exactly at the boundary: both inclusive directions fire, the
        // higher threshold does not.
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_mint_is_skipped() {
        let (store, _market, sink, worker) = setup(&[]).await;
        store
            .add_alert("u1", "MintB", AlertDirection::Above, 1.0)
            .await
            .unwrap();

        worker.tick().await.unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
        // Alert stays active and is re-evaluated next cycle.
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
    }
}
