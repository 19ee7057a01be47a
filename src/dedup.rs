//! Watermark and seen-set filtering for raw observations.

use crate::store::{Store, StoreError};
use crate::types::RawObservation;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Decides which raw observations are genuinely new and eligible for delivery.
///
/// Three gates, in order: the entity watermark (subscription-start cutoff),
/// the persisted seen-set, and a per-tick emission cap that prefers the oldest
/// eligible observations so delivery catches up chronologically after an
/// outage.
#[derive(Clone)]
pub struct DedupEngine {
    store: Store,
    max_per_tick: usize,
}

impl DedupEngine {
    pub fn new(store: Store, max_per_tick: usize) -> Self {
        Self {
            store,
            max_per_tick,
        }
    }

    /// Filters a fresh observation batch down to deliverable events,
    /// oldest first.
    pub async fn filter(
        &self,
        watermark: Option<DateTime<Utc>>,
        observations: Vec<RawObservation>,
    ) -> Result<Vec<RawObservation>, StoreError> {
        let candidates: Vec<RawObservation> = observations
            .into_iter()
            .filter(|obs| match watermark {
                Some(cutoff) => obs.timestamp > cutoff,
                None => true,
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = candidates.iter().map(|o| o.dedup_key.clone()).collect();
        let seen = self.store.seen_keys(&keys).await?;

        let eligible = apply_seen_and_cap(candidates, &seen, self.max_per_tick);

        debug!(
            eligible = eligible.len(),
            already_seen = seen.len(),
            "Dedup filter complete"
        );
        Ok(eligible)
    }
}

/// Seen-set exclusion plus the oldest-first emission cap. Split out so the
/// ordering rules are testable without a database.
fn apply_seen_and_cap(
    candidates: Vec<RawObservation>,
    seen: &HashSet<String>,
    cap: usize,
) -> Vec<RawObservation> {
    let mut eligible: Vec<RawObservation> = candidates
        .into_iter()
        .filter(|obs| !seen.contains(&obs.dedup_key))
        .collect();

    eligible.sort_by_key(|obs| obs.timestamp);
    eligible.truncate(cap);
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::{Engagement, ObservationPayload, PostKind, SocialPost, SourceType};
    use chrono::{Duration, TimeZone};

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

    #[tokio::test]
    async fn test_watermark_excludes_historical_posts() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine = DedupEngine::new(store, 5);

        let batch = vec![
            obs("1", t0() - Duration::hours(1)),
            obs("2", t0() + Duration::hours(1)),
            obs("3", t0() + Duration::hours(2)),
        ];

        let eligible = engine.filter(Some(t0()), batch).await.unwrap();
        let ids: Vec<&str> = eligible.iter().map(|o| o.dedup_key.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_observation_exactly_at_watermark_is_dropped() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine = DedupEngine::new(store, 5);

        let eligible = engine.filter(Some(t0()), vec![obs("1", t0())]).await.unwrap();
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn test_seen_posts_are_never_redelivered() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store
            .record_post("2", "alice", "alice", "already out", t0())
            .await
            .unwrap();
        let engine = DedupEngine::new(store, 5);

        let batch = vec![
            obs("2", t0() + Duration::hours(1)),
            obs("3", t0() + Duration::hours(2)),
        ];

        let eligible = engine.filter(Some(t0()), batch).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].dedup_key, "3");
    }

    #[tokio::test]
    async fn test_replaying_a_delivered_batch_yields_nothing() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let engine = DedupEngine::new(store.clone(), 5);

        let batch = vec![obs("1", t0() + Duration::hours(1))];
        let first = engine.filter(Some(t0()), batch.clone()).await.unwrap();
        assert_eq!(first.len(), 1);

        for o in &first {
            store
                .record_post(&o.dedup_key, "alice", "alice", "x", o.timestamp)
                .await
                .unwrap();
        }

        let second = engine.filter(Some(t0()), batch).await.unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_cap_prefers_oldest_first() {
        let batch = vec![
            obs("c", t0() + Duration::hours(3)),
            obs("a", t0() + Duration::hours(1)),
            obs("b", t0() + Duration::hours(2)),
        ];

        let eligible = apply_seen_and_cap(batch, &HashSet::new(), 2);
        let ids: Vec<&str> = eligible.iter().map(|o| o.dedup_key.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_no_watermark_means_no_cutoff() {
        let batch = vec![obs("1", t0() - Duration::days(365))];
        let eligible = apply_seen_and_cap(batch, &HashSet::new(), 5);
        assert_eq!(eligible.len(), 1);
    }
}
