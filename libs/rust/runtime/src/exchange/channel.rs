//! Exchange over tokio mpsc channels. Messages queue until the receiving
//! driver collects them at the start of its next round.

use std::{collections::{BTreeSet, HashMap}, sync::Arc, time::Duration};

use field_core::DeviceId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use super::{Exchange, ExchangeError, NeighborMessage};
use crate::table::NeighborTable;

#[derive(Debug)]
pub struct ChannelHub {
    senders: RwLock<HashMap<DeviceId, UnboundedSender<Arc<NeighborMessage>>>>,
    staleness: Duration,
}

impl ChannelHub {
    pub fn new() -> Arc<Self> { Self::with_staleness(NeighborTable::new().staleness()) }

    pub fn with_staleness(staleness: Duration) -> Arc<Self> {
        Arc::new(Self { senders: RwLock::new(HashMap::new()), staleness })
    }

    pub fn join(self: &Arc<Self>, id: DeviceId) -> ChannelExchange {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().insert(id.clone(), tx);
        ChannelExchange { id, hub: self.clone(), rx: Mutex::new(rx), inbox: NeighborTable::with_staleness(self.staleness) }
    }
}

#[derive(Debug)]
pub struct ChannelExchange {
    id: DeviceId,
    hub: Arc<ChannelHub>,
    rx: Mutex<UnboundedReceiver<Arc<NeighborMessage>>>,
    inbox: NeighborTable,
}

impl Exchange for ChannelExchange {
    fn device(&self) -> &DeviceId { &self.id }

    fn publish(&self, message: Arc<NeighborMessage>, recipients: &BTreeSet<DeviceId>) -> Result<(), ExchangeError> {
        let senders = self.hub.senders.read();
        for to in recipients {
            let Some(tx) = senders.get(to) else {
                trace!(from = %self.id, %to, "recipient_unknown");
                continue;
            };
            tx.send(message.clone()).map_err(|_| ExchangeError::Closed(to.clone()))?;
        }
        Ok(())
    }

    fn collect(&self) -> usize {
        let mut rx = self.rx.lock();
        let mut moved = 0;
        loop {
            match rx.try_recv() {
                Ok(msg) => { self.inbox.store(msg); moved += 1; }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        moved
    }

    fn inbox(&self) -> &NeighborTable { &self.inbox }
}

impl Drop for ChannelExchange {
    fn drop(&mut self) { self.hub.senders.write().remove(&self.id); }
}
