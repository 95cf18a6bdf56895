//! In-process exchange that writes straight into the recipients' tables.

use std::{collections::{BTreeSet, HashMap}, sync::Arc, time::Duration};

use field_core::DeviceId;
use parking_lot::RwLock;
use tracing::trace;

use super::{Exchange, ExchangeError, NeighborMessage};
use crate::table::NeighborTable;

#[derive(Debug)]
pub struct LocalHub {
    inboxes: RwLock<HashMap<DeviceId, Arc<NeighborTable>>>,
    staleness: Duration,
}

impl LocalHub {
    pub fn new() -> Arc<Self> { Self::with_staleness(NeighborTable::new().staleness()) }

    /// Inboxes of devices joining this hub forget entries older than `staleness`.
    pub fn with_staleness(staleness: Duration) -> Arc<Self> {
        Arc::new(Self { inboxes: RwLock::new(HashMap::new()), staleness })
    }

    /// Registers `id`, replacing any previous endpoint under the same id.
    pub fn join(self: &Arc<Self>, id: DeviceId) -> LocalExchange {
        let inbox = Arc::new(NeighborTable::with_staleness(self.staleness));
        self.inboxes.write().insert(id.clone(), inbox.clone());
        LocalExchange { id, hub: self.clone(), inbox }
    }

    pub fn leave(&self, id: &DeviceId) { self.inboxes.write().remove(id); }
}

#[derive(Debug)]
pub struct LocalExchange {
    id: DeviceId,
    hub: Arc<LocalHub>,
    inbox: Arc<NeighborTable>,
}

impl Exchange for LocalExchange {
    fn device(&self) -> &DeviceId { &self.id }

    fn publish(&self, message: Arc<NeighborMessage>, recipients: &BTreeSet<DeviceId>) -> Result<(), ExchangeError> {
        let inboxes = self.hub.inboxes.read();
        for to in recipients {
            match inboxes.get(to) {
                Some(inbox) => inbox.store(message.clone()),
                None => trace!(from = %self.id, %to, "recipient_unknown"),
            }
        }
        Ok(())
    }

    fn inbox(&self) -> &NeighborTable { &self.inbox }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_core::{ExportBuilder, Value};

    #[test]
    fn delivers_only_to_recipients() {
        let hub = LocalHub::new();
        let a = hub.join(DeviceId::new("a"));
        let b = hub.join(DeviceId::new("b"));
        let c = hub.join(DeviceId::new("c"));
        let msg = Arc::new(NeighborMessage::new(DeviceId::new("a"), 1, ExportBuilder::new().finish(Value::Number(1.0))));
        a.publish(msg, &[DeviceId::new("b"), DeviceId::new("zz")].into_iter().collect()).unwrap();
        assert!(b.latest(&DeviceId::new("a")).is_some());
        assert!(c.inbox().is_empty());
    }
}
