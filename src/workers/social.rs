//! Social polling worker: tracked profiles -> scraped posts -> new-post alerts.

use crate::adapters::ObservationSource;
use crate::dedup::DedupEngine;
use crate::delivery::{post_message, OutputChannel, SEND_PACING};
use crate::scheduler::Worker;
use crate::store::Store;
use crate::types::{ObservationPayload, SourceType, TrackedEntity};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Pause between profile fetches within one tick; concurrent scraping
/// sessions would multiply the automation fingerprint.
const FETCH_PACING: Duration = Duration::from_secs(2);

pub struct SocialWorker {
    store: Store,
    dedup: DedupEngine,
    adapter: Arc<dyn ObservationSource>,
    sink: Arc<dyn OutputChannel>,
    webhook: Option<String>,
}

impl SocialWorker {
    pub fn new(
        store: Store,
        dedup: DedupEngine,
        adapter: Arc<dyn ObservationSource>,
        sink: Arc<dyn OutputChannel>,
        webhook: Option<String>,
    ) -> Self {
        Self {
            store,
            dedup,
            adapter,
            sink,
            webhook,
        }
    }

    async fn process_handle(
        &self,
        webhook: &str,
        handle: &str,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let observations = self.adapter.observe(handle).await;
        if observations.is_empty() {
            info!(handle = handle, "No posts found");
            return Ok(0);
        }

        let eligible = self.dedup.filter(watermark, observations).await?;
        if eligible.is_empty() {
            return Ok(0);
        }

        info!(handle = handle, count = eligible.len(), "Delivering new posts");

        let mut delivered = 0;
        for obs in eligible {
            let ObservationPayload::Post(post) = &obs.payload else {
                continue;
            };

            // Record first, then send: a crash between the two loses one
            // delivery rather than duplicating it. A failed record still
            // sends; a repeat next tick beats a silently dropped alert.
            if let Err(e) = self
                .store
                .record_post(&obs.dedup_key, handle, &post.author, &post.content, obs.timestamp)
                .await
            {
                warn!(
                    handle = handle,
                    post_id = %obs.dedup_key,
                    error = %e,
                    "Failed to record post as seen, delivering anyway"
                );
            }

            let message = post_message(handle, post, &obs.dedup_key, obs.timestamp);
            if let Err(e) = self.sink.send(webhook, &message).await {
                warn!(handle = handle, post_id = %obs.dedup_key, error = %e, "Post delivery failed");
            } else {
                delivered += 1;
            }

            sleep(SEND_PACING).await;
        }
        Ok(delivered)
    }
}

/// Case-insensitive grouping of subscriptions by handle, keeping the
/// earliest watermark so one fetch serves every subscriber. A subscriber
/// without a watermark lifts the cutoff entirely.
pub fn effective_watermarks(
    entities: &[TrackedEntity],
) -> Vec<(String, Option<DateTime<Utc>>)> {
    let mut map: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for entity in entities {
        let handle = entity.key.to_lowercase();
        match map.entry(handle.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entity.watermark);
                order.push(handle);
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                *current = match (*current, entity.watermark) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    _ => None,
                };
            }
        }
    }

    order
        .into_iter()
        .map(|handle| {
            let watermark = map[&handle];
            (handle, watermark)
        })
        .collect()
}

#[async_trait]
impl Worker for SocialWorker {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn tick(&self) -> Result<()> {
        let Some(webhook) = self.webhook.clone() else {
            warn!("Tracked-posts webhook not configured, skipping tick");
            return Ok(());
        };

        let tracked = self.store.tracked(SourceType::Social).await?;
        if tracked.is_empty() {
            info!("No tracked social profiles");
            return Ok(());
        }

        let handles = effective_watermarks(&tracked);
        info!(handles = handles.len(), "Checking tracked profiles");

        for (handle, watermark) in handles {
            sleep(FETCH_PACING).await;
            // One failing handle never aborts the remainder of the tick.
            if let Err(e) = self.process_handle(&webhook, &handle, watermark).await {
                error!(handle = %handle, error = %e, "Failed to process handle");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::AlertMessage;
    use crate::types::{Engagement, PostKind, RawObservation, SocialPost};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    struct CannedSource {
        observations: Vec<RawObservation>,
    }

    #[async_trait]
    impl ObservationSource for CannedSource {
        async fn observe(&self, _entity_key: &str) -> Vec<RawObservation> {
            self.observations.clone()
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

    fn obs(id: &str, timestamp: DateTime<Utc>) -> RawObservation {
        RawObservation {
            source_type: SourceType::Social,
            dedup_key: id.to_string(),
            entity_key: "alice".to_string(),
            timestamp,
            payload: ObservationPayload::Post(SocialPost {
                author: "alice".to_string(),
                content: format!("post {}", id),
                kind: PostKind::Original,
                quoted_content: None,
                engagement: Engagement::default(),
            }),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn worker_with(
        observations: Vec<RawObservation>,
        webhook: Option<String>,
    ) -> (SocialWorker, Store, Arc<RecordingSink>) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .track(&TrackedEntity {
                source_type: SourceType::Social,
                key: "alice".to_string(),
                subscriber_id: "u1".to_string(),
                watermark: Some(t0()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let worker = SocialWorker::new(
            store.clone(),
            DedupEngine::new(store.clone(), 5),
            Arc::new(CannedSource { observations }),
            Arc::clone(&sink) as Arc<dyn OutputChannel>,
            webhook,
        );
        (worker, store, sink)
    }

    #[tokio::test]
    async fn test_watermark_and_seen_set_scenario() {
        // Watermark at T0; adapter returns T0-1h, T0+1h, T0+2h. The T0+1h
        // post is already in the seen-set, so only T0+2h goes out.
        let batch = vec![
            obs("1", t0() - ChronoDuration::hours(1)),
            obs("2", t0() + ChronoDuration::hours(1)),
            obs("3", t0() + ChronoDuration::hours(2)),
        ];
        let (worker, store, sink) =
            worker_with(batch, Some("http://hook".to_string())).await;
        store
            .record_post("2", "alice", "alice", "post 2", t0())
            .await
            .unwrap();

        worker.tick().await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].embeds[0]
            .url
            .as_deref()
            .unwrap()
            .ends_with("/status/3"));
        drop(sent);

        // Delivered post is recorded as seen afterward.
        let seen = store.seen_keys(&["3".to_string()]).await.unwrap();
        assert!(seen.contains("3"));
    }

    #[tokio::test]
    async fn test_second_tick_delivers_nothing_new() {
        let batch = vec![obs("10", t0() + ChronoDuration::hours(1))];
        let (worker, _store, sink) =
            worker_with(batch, Some("http://hook".to_string())).await;

        worker.tick().await.unwrap();
        worker.tick().await.unwrap();

        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_webhook_skips_entire_tick() {
        let batch = vec![obs("10", t0() + ChronoDuration::hours(1))];
        let (worker, store, sink) = worker_with(batch, None).await;

        worker.tick().await.unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
        // Nothing was marked seen either; the next configured tick delivers.
        let seen = store.seen_keys(&["10".to_string()]).await.unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_effective_watermark_is_earliest_across_subscribers() {
        let early = t0() - ChronoDuration::days(2);
        let entities = vec![
            TrackedEntity {
                source_type: SourceType::Social,
                key: "Alice".to_string(),
                subscriber_id: "u1".to_string(),
                watermark: Some(t0()),
                created_at: Utc::now(),
            },
            TrackedEntity {
                source_type: SourceType::Social,
                key: "alice".to_string(),
                subscriber_id: "u2".to_string(),
                watermark: Some(early),
                created_at: Utc::now(),
            },
        ];

        let grouped = effective_watermarks(&entities);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "alice");
        assert_eq!(grouped[0].1, Some(early));
    }
}
