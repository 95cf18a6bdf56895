//! Neighbor exchange: how exports leave one device and land in the neighbor
//! tables of others.
//!
//! Delivery is best-effort. Messages may be lost, duplicated or arrive out of
//! order; the receiving [`NeighborTable`] keeps whatever arrived last.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use field_core::{DeviceId, Export};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::NeighborTable;

pub mod channel;
pub mod local;
pub mod nats;

pub use channel::{ChannelExchange, ChannelHub};
pub use local::{LocalExchange, LocalHub};
pub use nats::{NatsExchange, PeerDirectory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborMessage {
    pub from: DeviceId,
    pub round: u64,
    pub sent_at: DateTime<Utc>,
    pub export: Arc<Export>,
}

impl NeighborMessage {
    pub fn new(from: DeviceId, round: u64, export: Export) -> Self {
        Self { from, round, sent_at: Utc::now(), export: Arc::new(export) }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ExchangeError> { bincode::serialize(self).map_err(ExchangeError::Codec) }

    pub fn decode(bytes: &[u8]) -> Result<Self, ExchangeError> { bincode::deserialize(bytes).map_err(ExchangeError::Codec) }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("channel to {0} closed")]
    Closed(DeviceId),
    #[error("transport: {0}")]
    Transport(String),
}

/// One device's endpoint on an exchange.
pub trait Exchange: Send + Sync {
    fn device(&self) -> &DeviceId;

    /// Hands `message` to the transport for delivery to `recipients`.
    /// Returning does not mean anyone received it.
    fn publish(&self, message: Arc<NeighborMessage>, recipients: &BTreeSet<DeviceId>) -> Result<(), ExchangeError>;

    /// Moves anything the transport buffered into the inbox. Returns the
    /// number of messages moved.
    fn collect(&self) -> usize { 0 }

    fn inbox(&self) -> &NeighborTable;

    fn latest(&self, from: &DeviceId) -> Option<Arc<NeighborMessage>> { self.inbox().latest(from) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_core::{ExportBuilder, Path, Slot, Value};

    #[test]
    fn codec_keeps_paths_and_infinity() {
        let mut builder = ExportBuilder::new();
        builder.put(Path::root().push(Slot::Rep(0)), Value::Number(f64::INFINITY));
        let msg = NeighborMessage::new(DeviceId::new("a"), 7, builder.finish(Value::Number(f64::INFINITY)));
        let back = NeighborMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
        assert!(matches!(back.export.root(), Some(Value::Number(n)) if n.is_infinite()));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(NeighborMessage::decode(&[1, 2, 3]), Err(ExchangeError::Codec(_))));
    }
}
