//! Where round outcomes go.

use std::collections::BTreeMap;

use field_core::{DeviceId, Value};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::driver::{RoundFailure, RoundReport};

pub trait Actuator: Send + Sync {
    fn actuate(&self, report: &RoundReport);

    fn report_failure(&self, failure: &RoundFailure) { let _ = failure; }
}

/// Logs every outcome. Default for standalone nodes.
#[derive(Debug, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn actuate(&self, report: &RoundReport) {
        info!(device = %report.device, round = report.round, value = %report.value, neighbors = report.neighbors, "field_value");
    }

    fn report_failure(&self, failure: &RoundFailure) {
        warn!(device = %failure.device, round = failure.round, path = %failure.path, kind = %failure.kind, "round_failed");
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceView {
    pub round: u64,
    pub value: Option<Value>,
    pub failures: u64,
    pub last_error: Option<String>,
}

/// Keeps the latest outcome per device so a field can be inspected while
/// drivers run on their own tasks.
#[derive(Debug, Default)]
pub struct FieldRecorder {
    views: RwLock<BTreeMap<DeviceId, DeviceView>>,
}

impl FieldRecorder {
    pub fn new() -> Self { Self::default() }

    pub fn value(&self, device: &DeviceId) -> Option<Value> { self.views.read().get(device).and_then(|v| v.value.clone()) }

    pub fn view(&self, device: &DeviceId) -> Option<DeviceView> { self.views.read().get(device).cloned() }

    /// Latest successful value of every device that has one.
    pub fn field(&self) -> BTreeMap<DeviceId, Value> {
        self.views.read().iter().filter_map(|(id, v)| Some((id.clone(), v.value.clone()?))).collect()
    }
}

impl Actuator for FieldRecorder {
    fn actuate(&self, report: &RoundReport) {
        let mut views = self.views.write();
        let view = views.entry(report.device.clone()).or_default();
        view.round = report.round;
        view.value = Some(report.value.clone());
    }

    fn report_failure(&self, failure: &RoundFailure) {
        let mut views = self.views.write();
        let view = views.entry(failure.device.clone()).or_default();
        view.round = failure.round;
        view.failures += 1;
        view.last_error = Some(failure.to_string());
    }
}
