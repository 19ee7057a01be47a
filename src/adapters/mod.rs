//! Source adapters: one tracked entity in, ordered raw observations out.

pub mod social;

use crate::types::RawObservation;
use async_trait::async_trait;

/// Capability of turning one tracked entity key into an ordered sequence of
/// raw observations, most recent first.
///
/// Implementations never let an internal failure escape this boundary; on
/// any error they log and return an empty sequence, and the next polling
/// cycle retries.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self, entity_key: &str) -> Vec<RawObservation>;
}
