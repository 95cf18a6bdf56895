//! NATS-backed exchange for devices running as separate processes.
//!
//! Each device publishes bincode-encoded exports on `{prefix}.device.{id}` and
//! subscribes to `{prefix}.device.*`. Membership comes from periodic JSON
//! hello messages on `{prefix}.hello`, tracked by [`PeerDirectory`].

use std::{collections::{BTreeSet, HashMap}, sync::Arc, time::Duration};

use field_core::DeviceId;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, info, warn};

use super::{Exchange, ExchangeError, NeighborMessage};
use crate::metrics::EXCHANGE_METRICS;
use crate::table::NeighborTable;
use crate::topology::Topology;

pub struct NatsExchange {
    id: DeviceId,
    client: async_nats::Client,
    subject: String,
    inbox: Arc<NeighborTable>,
    runtime: Handle,
}

impl NatsExchange {
    /// Subscribes to the device subjects under `prefix` and starts storing
    /// messages from other devices, which read as absent once older than
    /// `staleness`. Must be called inside a tokio runtime.
    pub async fn connect(client: async_nats::Client, prefix: &str, id: DeviceId, staleness: Duration) -> Result<Self, ExchangeError> {
        let mut sub = client
            .subscribe(format!("{prefix}.device.*"))
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let inbox = Arc::new(NeighborTable::with_staleness(staleness));
        let table = inbox.clone();
        let me = id.clone();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                match NeighborMessage::decode(&msg.payload) {
                    Ok(m) if m.from == me => {}
                    Ok(m) => table.store(Arc::new(m)),
                    Err(e) => {
                        EXCHANGE_METRICS.decode_errors_total.inc();
                        debug!(error = %e, subject = %msg.subject, "neighbor_message_dropped");
                    }
                }
            }
            info!(device = %me, "exchange_subscription_ended");
        });
        Ok(Self { subject: format!("{prefix}.device.{id}"), id, client, inbox, runtime: Handle::current() })
    }
}

impl Exchange for NatsExchange {
    fn device(&self) -> &DeviceId { &self.id }

    /// Publishes once on the device subject; receivers filter by their own
    /// neighbor sets, so `recipients` is not consulted.
    fn publish(&self, message: Arc<NeighborMessage>, _recipients: &BTreeSet<DeviceId>) -> Result<(), ExchangeError> {
        let bytes = message.encode()?;
        let client = self.client.clone();
        let subject = self.subject.clone();
        self.runtime.spawn(async move {
            if let Err(e) = client.publish(subject, bytes.into()).await {
                warn!(error = %e, "publish_failed");
            }
        });
        Ok(())
    }

    fn inbox(&self) -> &NeighborTable { &self.inbox }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hello {
    device_id: String,
    ts: i64,
}

/// Devices heard from recently. Serves as the topology for NATS-connected
/// nodes: everyone announcing on the same prefix is a neighbor until their
/// hellos stop for longer than the TTL.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    me: DeviceId,
    ttl: Duration,
    seen: Arc<RwLock<HashMap<DeviceId, Instant>>>,
}

impl PeerDirectory {
    pub fn new(me: DeviceId, ttl: Duration) -> Self { Self { me, ttl, seen: Arc::new(RwLock::new(HashMap::new())) } }

    pub fn observe(&self, peer: DeviceId) { self.observe_at(peer, Instant::now()) }

    pub fn observe_at(&self, peer: DeviceId, at: Instant) {
        if peer != self.me { self.seen.write().insert(peer, at); }
    }

    pub fn peers_at(&self, now: Instant) -> BTreeSet<DeviceId> {
        self.seen
            .read()
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) <= self.ttl)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Announces this device every `interval` and listens for other
    /// announcements. Both tasks live as long as the runtime.
    pub async fn spawn(&self, client: async_nats::Client, prefix: &str, interval: Duration) -> Result<(), ExchangeError> {
        let subject = format!("{prefix}.hello");
        let mut sub = client.subscribe(subject.clone()).await.map_err(|e| ExchangeError::Transport(e.to_string()))?;
        let listener = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                match serde_json::from_slice::<Hello>(&msg.payload) {
                    Ok(hello) => listener.observe(DeviceId::new(hello.device_id)),
                    Err(e) => debug!(error = %e, "non_hello_ignored"),
                }
            }
        });
        let me = self.me.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let hello = Hello { device_id: me.to_string(), ts: chrono::Utc::now().timestamp_millis() };
                match serde_json::to_vec(&hello) {
                    Ok(bytes) => {
                        if let Err(e) = client.publish(subject.clone(), bytes.into()).await { warn!(error = %e, "hello_publish_failed"); }
                    }
                    Err(e) => warn!(error = ?e, "serialize_error"),
                }
            }
        });
        Ok(())
    }
}

impl Topology for PeerDirectory {
    fn neighbors(&self, device: &DeviceId) -> BTreeSet<DeviceId> {
        if device != &self.me { return BTreeSet::new(); }
        self.peers_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_expire_after_ttl() {
        let dir = PeerDirectory::new(DeviceId::new("me"), Duration::from_secs(5));
        let t0 = Instant::now();
        dir.observe_at(DeviceId::new("me"), t0);
        dir.observe_at(DeviceId::new("a"), t0);
        dir.observe_at(DeviceId::new("b"), t0 + Duration::from_secs(4));
        let later = dir.peers_at(t0 + Duration::from_secs(6));
        assert_eq!(later.into_iter().map(|d| d.0).collect::<Vec<_>>(), vec!["b".to_string()]);
    }
}
