//! Latest export received from each neighbor.

use std::{collections::{BTreeSet, HashMap}, sync::Arc, time::Duration};

use field_core::{DeviceId, NeighborSnapshot};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::config::DriverConfig;
use crate::exchange::NeighborMessage;
use crate::metrics::EXCHANGE_METRICS;

#[derive(Debug, Clone)]
struct Entry {
    message: Arc<NeighborMessage>,
    received_at: Instant,
}

/// Arrival order wins: a message replaces whatever is stored for its sender,
/// even if it carries a lower round number. Entries older than the staleness
/// window read as absent.
#[derive(Debug)]
pub struct NeighborTable {
    entries: RwLock<HashMap<DeviceId, Entry>>,
    staleness: Duration,
}

impl Default for NeighborTable {
    fn default() -> Self { Self::with_staleness(DriverConfig::default().staleness()) }
}

impl NeighborTable {
    pub fn new() -> Self { Self::default() }

    pub fn with_staleness(staleness: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), staleness }
    }

    pub fn staleness(&self) -> Duration { self.staleness }

    fn is_fresh(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.received_at) <= self.staleness
    }

    pub fn store(&self, message: Arc<NeighborMessage>) { self.store_at(message, Instant::now()) }

    pub fn store_at(&self, message: Arc<NeighborMessage>, received_at: Instant) {
        EXCHANGE_METRICS.messages_received_total.inc();
        self.entries.write().insert(message.from.clone(), Entry { message, received_at });
    }

    /// Latest fresh message from `from`.
    pub fn latest(&self, from: &DeviceId) -> Option<Arc<NeighborMessage>> { self.latest_at(from, Instant::now()) }

    pub fn latest_at(&self, from: &DeviceId, now: Instant) -> Option<Arc<NeighborMessage>> {
        self.entries.read().get(from).filter(|e| self.is_fresh(e, now)).map(|e| e.message.clone())
    }

    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    /// Exports of the listed neighbors that are fresh at `now`. Neighbors
    /// with nothing fresh are simply missing.
    pub fn snapshot(&self, neighbors: &BTreeSet<DeviceId>, now: Instant) -> NeighborSnapshot {
        let entries = self.entries.read();
        neighbors
            .iter()
            .filter_map(|id| {
                let entry = entries.get(id)?;
                self.is_fresh(entry, now).then(|| (id.clone(), entry.message.export.clone()))
            })
            .collect()
    }

    /// Drops entries that are stale at `now`, returning how many went.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let staleness = self.staleness;
        entries.retain(|_, e| now.saturating_duration_since(e.received_at) <= staleness);
        let evicted = before - entries.len();
        if evicted > 0 {
            EXCHANGE_METRICS.stale_evictions_total.inc_by(evicted as u64);
            debug!(evicted, "neighbor_entries_evicted");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_core::{Export, ExportBuilder, Value};

    fn message(from: &str, round: u64, root: f64) -> Arc<NeighborMessage> {
        let export: Export = ExportBuilder::new().finish(Value::Number(root));
        Arc::new(NeighborMessage::new(DeviceId::new(from), round, export))
    }

    #[test]
    fn last_arrival_wins() {
        let table = NeighborTable::new();
        table.store(message("a", 5, 1.0));
        table.store(message("a", 3, 2.0));
        let latest = table.latest(&DeviceId::new("a")).unwrap();
        assert_eq!(latest.round, 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn snapshot_filters_by_neighbors_and_age() {
        let table = NeighborTable::with_staleness(Duration::from_millis(500));
        let t0 = Instant::now();
        table.store_at(message("a", 1, 1.0), t0);
        table.store_at(message("b", 1, 2.0), t0 + Duration::from_millis(900));
        table.store_at(message("c", 1, 3.0), t0 + Duration::from_millis(900));
        let wanted: BTreeSet<DeviceId> = ["a", "b"].into_iter().map(DeviceId::from).collect();
        let now = t0 + Duration::from_millis(1000);
        let snap = table.snapshot(&wanted, now);
        assert_eq!(snap.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(table.evict_stale(now), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn latest_hides_stale_entries() {
        let table = NeighborTable::with_staleness(Duration::from_millis(500));
        let t0 = Instant::now();
        table.store_at(message("a", 1, 1.0), t0);
        let a = DeviceId::new("a");
        assert!(table.latest_at(&a, t0 + Duration::from_millis(500)).is_some());
        assert!(table.latest_at(&a, t0 + Duration::from_millis(501)).is_none());
        // Still stored until evicted.
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_expires_with_the_clock() {
        let table = NeighborTable::with_staleness(Duration::from_millis(500));
        table.store(message("a", 1, 1.0));
        let a = DeviceId::new("a");
        assert!(table.latest(&a).is_some());
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(table.latest(&a).is_none());
        table.store(message("a", 2, 2.0));
        assert_eq!(table.latest(&a).unwrap().round, 2);
    }

    #[test]
    fn default_window_matches_driver_defaults() {
        assert_eq!(NeighborTable::new().staleness(), DriverConfig::default().staleness());
    }
}
