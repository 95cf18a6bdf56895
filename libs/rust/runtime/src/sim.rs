//! In-process simulation: many devices over a [`StaticTopology`] sharing a
//! [`LocalHub`]. Devices can be stepped one at a time in id order, which is
//! deterministic, or spawned as independent tokio tasks.

use std::{collections::BTreeMap, sync::Arc};

use field_core::{DeviceId, DeviceState, Export, Expr, SensorMap, Sensors, Value};
use parking_lot::RwLock;
use tracing::info;

use crate::actuator::FieldRecorder;
use crate::config::DriverConfig;
use crate::driver::{DeviceHandle, RoundDriver, RoundFailure, RoundReport, Wiring};
use crate::exchange::LocalHub;
use crate::topology::StaticTopology;

/// Sensor table that can be edited while a driver reads it.
#[derive(Debug, Clone, Default)]
pub struct SharedSensors(Arc<RwLock<SensorMap>>);

impl SharedSensors {
    pub fn new(map: SensorMap) -> Self { Self(Arc::new(RwLock::new(map))) }
    pub fn set(&self, name: &str, value: impl Into<Value>) { self.0.write().set(name, value); }
    pub fn set_relative(&self, name: &str, neighbor: DeviceId, value: impl Into<Value>) { self.0.write().set_relative(name, neighbor, value); }
    pub fn remove(&self, name: &str) -> Option<Value> { self.0.write().remove(name) }
}

impl Sensors for SharedSensors {
    fn sense(&self, name: &str) -> Option<Value> { self.0.read().sense(name) }
    fn neighbor_sense(&self, name: &str, neighbor: &DeviceId) -> Option<Value> { self.0.read().neighbor_sense(name, neighbor) }
}

struct SimDevice {
    driver: RoundDriver,
    sensors: SharedSensors,
}

pub struct Simulation {
    program: Arc<Expr>,
    config: DriverConfig,
    hub: Arc<LocalHub>,
    topology: Arc<StaticTopology>,
    recorder: Arc<FieldRecorder>,
    devices: BTreeMap<DeviceId, SimDevice>,
}

impl Simulation {
    /// One device per node of `topology`, all running `program`.
    pub fn new(program: Expr, topology: StaticTopology, config: DriverConfig) -> Self {
        let hub = LocalHub::with_staleness(config.staleness());
        let mut sim = Self {
            program: Arc::new(program),
            config,
            hub,
            topology: Arc::new(topology),
            recorder: Arc::new(FieldRecorder::new()),
            devices: BTreeMap::new(),
        };
        for id in sim.topology.devices() { sim.add_device(id); }
        sim
    }

    pub fn add_device(&mut self, id: DeviceId) {
        self.topology.add_device(&id);
        let sensors = SharedSensors::default();
        let wiring = Wiring {
            sensors: Arc::new(sensors.clone()),
            topology: self.topology.clone(),
            exchange: Arc::new(self.hub.join(id.clone())),
            actuator: self.recorder.clone(),
        };
        let driver = RoundDriver::new(id.clone(), self.program.clone(), self.config.clone(), wiring);
        self.devices.insert(id, SimDevice { driver, sensors });
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> { self.devices.keys() }

    pub fn sensors(&self, id: &DeviceId) -> Option<&SharedSensors> { self.devices.get(id).map(|d| &d.sensors) }

    pub fn set_sensor(&self, id: &DeviceId, name: &str, value: impl Into<Value>) {
        if let Some(d) = self.devices.get(id) { d.sensors.set(name, value); }
    }

    /// Sets `name` to the same value on every device.
    pub fn set_sensor_all(&self, name: &str, value: impl Into<Value> + Clone) {
        for d in self.devices.values() { d.sensors.set(name, value.clone()); }
    }

    /// Symmetric neighbor-relative reading between `a` and `b`.
    pub fn set_distance(&self, name: &str, a: &DeviceId, b: &DeviceId, value: f64) {
        if let Some(d) = self.devices.get(a) { d.sensors.set_relative(name, b.clone(), value); }
        if let Some(d) = self.devices.get(b) { d.sensors.set_relative(name, a.clone(), value); }
    }

    pub fn link(&self, a: &DeviceId, b: &DeviceId) { self.topology.link(a, b); }
    pub fn unlink(&self, a: &DeviceId, b: &DeviceId) { self.topology.unlink(a, b); }

    pub fn step_device(&mut self, id: &DeviceId) -> Option<Result<RoundReport, RoundFailure>> {
        self.devices.get_mut(id).map(|d| d.driver.step())
    }

    /// One round of every device, in id order.
    pub fn step_all(&mut self) -> Vec<Result<RoundReport, RoundFailure>> {
        self.devices.values_mut().map(|d| d.driver.step()).collect()
    }

    pub fn run_rounds(&mut self, rounds: usize) {
        for _ in 0..rounds { self.step_all(); }
    }

    pub fn value(&self, id: &DeviceId) -> Option<Value> { self.recorder.value(id) }

    pub fn field(&self) -> BTreeMap<DeviceId, Value> { self.recorder.field() }

    pub fn export(&self, id: &DeviceId) -> Option<Arc<Export>> { self.devices.get(id)?.driver.last_export().cloned() }

    pub fn state(&self, id: &DeviceId) -> Option<&DeviceState> { self.devices.get(id).map(|d| d.driver.state()) }

    /// Runs every device on its own task, paced by the configured interval.
    pub fn spawn(self) -> RunningSimulation {
        info!(devices = self.devices.len(), "simulation_spawned");
        let mut handles = Vec::with_capacity(self.devices.len());
        let mut sensors = BTreeMap::new();
        for (id, d) in self.devices {
            sensors.insert(id, d.sensors);
            handles.push(d.driver.spawn());
        }
        RunningSimulation { topology: self.topology, recorder: self.recorder, sensors, handles }
    }
}

pub struct RunningSimulation {
    topology: Arc<StaticTopology>,
    recorder: Arc<FieldRecorder>,
    sensors: BTreeMap<DeviceId, SharedSensors>,
    handles: Vec<DeviceHandle>,
}

impl RunningSimulation {
    pub fn field(&self) -> BTreeMap<DeviceId, Value> { self.recorder.field() }
    pub fn value(&self, id: &DeviceId) -> Option<Value> { self.recorder.value(id) }
    pub fn sensors(&self, id: &DeviceId) -> Option<&SharedSensors> { self.sensors.get(id) }
    pub fn link(&self, a: &DeviceId, b: &DeviceId) { self.topology.link(a, b); }
    pub fn unlink(&self, a: &DeviceId, b: &DeviceId) { self.topology.unlink(a, b); }

    /// Stops every device and returns the drivers in id order.
    pub async fn stop(self) -> Result<Vec<RoundDriver>, tokio::task::JoinError> {
        let mut drivers = Vec::with_capacity(self.handles.len());
        for handle in self.handles { drivers.push(handle.stop().await?); }
        Ok(drivers)
    }
}
