//! In-memory store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the hub without a storage section in the config
//!
//! All data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, HistoryQuery, Store};
use super::error::StorageResult;
use crate::{Authority, BreakdownEvent, HistoryPoint, RecordedBreakdown, TelemetrySample};

/// In-memory store
///
/// Each table sits behind its own lock, so history appends never contend
/// with current-state replacement.
#[derive(Default)]
pub struct MemoryStore {
    /// Latest sample per node
    current: RwLock<HashMap<String, TelemetrySample>>,

    /// History points grouped by node
    history: RwLock<HashMap<String, Vec<HistoryPoint>>>,

    /// Every breakdown ever recorded, in insertion order
    breakdowns: RwLock<Vec<RecordedBreakdown>>,

    authorities: RwLock<Vec<Authority>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with authorities
    pub fn with_authorities(authorities: impl IntoIterator<Item = Authority>) -> Self {
        Self {
            authorities: RwLock::new(authorities.into_iter().collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn reconcile_current(&self, sample: &TelemetrySample) -> StorageResult<()> {
        trace!("replacing current record for {}", sample.node_id);
        self.current
            .write()
            .await
            .insert(sample.node_id.clone(), sample.clone());
        Ok(())
    }

    async fn current_for(&self, node_id: &str) -> StorageResult<Option<TelemetrySample>> {
        Ok(self.current.read().await.get(node_id).cloned())
    }

    async fn list_current(&self, limit: usize) -> StorageResult<Vec<TelemetrySample>> {
        let mut samples: Vec<TelemetrySample> =
            self.current.read().await.values().cloned().collect();
        samples.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        samples.truncate(limit);
        Ok(samples)
    }

    async fn append_history(&self, node_id: &str, point: HistoryPoint) -> StorageResult<()> {
        self.history
            .write()
            .await
            .entry(node_id.to_string())
            .or_default()
            .push(point);
        Ok(())
    }

    async fn query_history(&self, query: HistoryQuery) -> StorageResult<Vec<HistoryPoint>> {
        debug!("querying in-memory history for {}", query.node_id);

        let history = self.history.read().await;
        let mut points: Vec<HistoryPoint> = history
            .get(&query.node_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| query.contains(&p.timestamp))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(limit) = query.limit {
            let skip = points.len().saturating_sub(limit);
            points.drain(..skip);
        }

        Ok(points)
    }

    async fn append_breakdown(&self, event: &BreakdownEvent) -> StorageResult<RecordedBreakdown> {
        // ids follow insertion order, so they are taken under the write lock
        let mut breakdowns = self.breakdowns.write().await;
        let recorded = RecordedBreakdown {
            id: breakdowns.last().map_or(1, |last| last.id + 1),
            recorded_at: Utc::now(),
            event: event.clone(),
        };
        breakdowns.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_breakdowns(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<RecordedBreakdown>> {
        let breakdowns = self.breakdowns.read().await;
        Ok(breakdowns
            .iter()
            .rev()
            .filter(|b| node_id.is_none_or(|id| b.event.node_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_breakdowns(&self) -> StorageResult<u64> {
        Ok(self.breakdowns.read().await.len() as u64)
    }

    async fn query_authorities(&self, node_id: &str) -> StorageResult<Vec<Authority>> {
        Ok(self
            .authorities
            .read()
            .await
            .iter()
            .filter(|a| a.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn upsert_authority(&self, authority: Authority) -> StorageResult<()> {
        let mut authorities = self.authorities.write().await;
        match authorities
            .iter_mut()
            .find(|a| a.entity_id == authority.entity_id)
        {
            Some(existing) => *existing = authority,
            None => authorities.push(authority),
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                (
                    "nodes".to_string(),
                    self.current.read().await.len().to_string(),
                ),
                (
                    "breakdowns".to_string(),
                    self.breakdowns.read().await.len().to_string(),
                ),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
