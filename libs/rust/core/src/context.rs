//! Evaluation context.
//!
//! [`RoundInputs`] is the per-round snapshot the round driver assembles;
//! [`Context`] adds the position inside the program (path, bindings, focus).
//! Contexts are never modified: entering a scope derives a new one that is
//! dropped when the scope returns.

use std::{collections::BTreeMap, sync::Arc};

use crate::error::ErrorKind;
use crate::export::{DeviceId, DeviceState, Export};
use crate::path::{Path, Slot};
use crate::sensors::Sensors;
use crate::value::{Env, Value};

/// Latest export per neighbor, as seen at the start of a round.
pub type NeighborSnapshot = BTreeMap<DeviceId, Arc<Export>>;

pub struct RoundInputs<'a> {
    pub device: &'a DeviceId,
    pub sensors: &'a dyn Sensors,
    pub state: &'a DeviceState,
    pub neighbors: &'a NeighborSnapshot,
}

/// Whose view `Nbr` reads return.
#[derive(Clone, Copy)]
pub enum Focus<'a> {
    Local,
    Neighbor { id: &'a DeviceId, export: &'a Export },
}

#[derive(Clone)]
pub struct Context<'a> {
    inputs: &'a RoundInputs<'a>,
    path: Path,
    env: Env,
    focus: Focus<'a>,
    recording: bool,
}

impl<'a> Context<'a> {
    pub fn root(inputs: &'a RoundInputs<'a>) -> Self {
        Self { inputs, path: Path::root(), env: Env::new(), focus: Focus::Local, recording: true }
    }

    pub fn path(&self) -> &Path { &self.path }
    pub fn env(&self) -> &Env { &self.env }
    pub fn focus(&self) -> Focus<'a> { self.focus }
    pub fn device(&self) -> &'a DeviceId { self.inputs.device }

    /// Whether values produced here belong in this device's export.
    pub fn is_recording(&self) -> bool { self.recording }

    pub fn nest(&self, slot: Slot) -> Self {
        Self { path: self.path.push(slot), ..self.clone() }
    }

    pub fn bind(&self, name: &str, value: Value) -> Self {
        Self { env: self.env.with(name, value), ..self.clone() }
    }

    pub fn with_env(&self, env: Env) -> Self {
        Self { env, ..self.clone() }
    }

    /// Same position, local focus. Recording is inherited, so a fold nested in
    /// a neighbor-focused evaluation stays silent.
    pub fn local(&self) -> Self {
        Self { focus: Focus::Local, ..self.clone() }
    }

    pub(crate) fn focused_on(&self, id: &'a DeviceId, export: &'a Export) -> Self {
        Self { focus: Focus::Neighbor { id, export }, recording: false, ..self.clone() }
    }

    pub fn silent(&self) -> Self {
        Self { recording: false, ..self.clone() }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, ErrorKind> {
        self.env.get(name).cloned().ok_or_else(|| ErrorKind::UnboundVariable(name.to_string()))
    }

    pub fn sense(&self, name: &str) -> Result<Value, ErrorKind> {
        self.inputs.sensors.sense(name).ok_or_else(|| ErrorKind::SensorUnavailable(name.to_string()))
    }

    pub fn neighbor_sense(&self, name: &str) -> Result<Value, ErrorKind> {
        let target = match self.focus {
            Focus::Local => self.inputs.device,
            Focus::Neighbor { id, .. } => id,
        };
        self.inputs.sensors.neighbor_sense(name, target).ok_or_else(|| ErrorKind::SensorUnavailable(name.to_string()))
    }

    /// Last round's value remembered at the current path.
    pub fn remembered(&self) -> Option<&'a Value> { self.inputs.state.get(&self.path) }

    /// Neighbors whose export holds a value at the current path, in id order.
    pub fn aligned_neighbors(&self) -> Vec<(&'a DeviceId, &'a Export)> {
        self.inputs
            .neighbors
            .iter()
            .filter(|(id, export)| *id != self.inputs.device && export.contains(&self.path))
            .map(|(id, export)| (id, &**export))
            .collect()
    }
}
