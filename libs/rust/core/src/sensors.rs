//! Sensor collaborator contract.

use std::collections::HashMap;

use crate::export::DeviceId;
use crate::value::Value;

/// Supplies sensed values for the current round. A `None` surfaces as
/// `SensorUnavailable`; it is never silently defaulted.
pub trait Sensors: Send + Sync {
    fn sense(&self, name: &str) -> Option<Value>;

    /// Value of a neighbor-relative sensor (e.g. distance) towards `neighbor`.
    /// Called with the device's own id when evaluating locally.
    fn neighbor_sense(&self, name: &str, neighbor: &DeviceId) -> Option<Value> {
        let _ = (name, neighbor);
        None
    }
}

/// Static sensor table, convenient for tests and fixed deployments.
#[derive(Debug, Clone, Default)]
pub struct SensorMap {
    local: HashMap<String, Value>,
    relative: HashMap<(String, DeviceId), Value>,
}

impl SensorMap {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) { self.local.insert(name.into(), value.into()); }

    pub fn set_relative(&mut self, name: impl Into<String>, neighbor: DeviceId, value: impl Into<Value>) {
        self.relative.insert((name.into(), neighbor), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> { self.local.remove(name) }
}

impl Sensors for SensorMap {
    fn sense(&self, name: &str) -> Option<Value> { self.local.get(name).cloned() }

    fn neighbor_sense(&self, name: &str, neighbor: &DeviceId) -> Option<Value> {
        self.relative.get(&(name.to_string(), neighbor.clone())).cloned()
    }
}
