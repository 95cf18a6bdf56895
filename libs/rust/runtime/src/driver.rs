//! Per-device round driver.
//!
//! One round: poll the topology, collect inbound exports, snapshot fresh
//! neighbors, evaluate, archive Rep state, publish, actuate. A failed
//! evaluation leaves state untouched and publishes nothing.

use std::{collections::BTreeSet, sync::Arc};

use field_core::{evaluate, DeviceId, DeviceState, ErrorKind, Export, Expr, Path, RoundInputs, Sensors, Value};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time::{Instant, MissedTickBehavior}};
use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::config::DriverConfig;
use crate::exchange::{Exchange, NeighborMessage};
use crate::metrics::ROUND_METRICS;
use crate::phase::{PhaseTracker, RoundPhase};
use crate::topology::Topology;

#[derive(Debug, Clone)]
pub struct RoundReport {
    pub device: DeviceId,
    pub round: u64,
    pub value: Value,
    pub export: Arc<Export>,
    /// Neighbors whose exports took part in the round.
    pub neighbors: usize,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("round {round} of {device} failed: {kind} at {path}")]
pub struct RoundFailure {
    pub device: DeviceId,
    pub round: u64,
    pub path: Path,
    pub kind: ErrorKind,
}

/// Collaborators a driver talks to.
#[derive(Clone)]
pub struct Wiring {
    pub sensors: Arc<dyn Sensors>,
    pub topology: Arc<dyn Topology>,
    pub exchange: Arc<dyn Exchange>,
    pub actuator: Arc<dyn Actuator>,
}

pub struct RoundDriver {
    id: DeviceId,
    program: Arc<Expr>,
    config: DriverConfig,
    wiring: Wiring,
    state: DeviceState,
    round: u64,
    phases: PhaseTracker,
    last_export: Option<Arc<Export>>,
    rounds_since_publish: u32,
}

impl RoundDriver {
    pub fn new(id: DeviceId, program: Arc<Expr>, config: DriverConfig, wiring: Wiring) -> Self {
        Self { id, program, config, wiring, state: DeviceState::new(), round: 0, phases: PhaseTracker::new(), last_export: None, rounds_since_publish: 0 }
    }

    pub fn device(&self) -> &DeviceId { &self.id }
    pub fn state(&self) -> &DeviceState { &self.state }
    pub fn phase(&self) -> RoundPhase { self.phases.phase() }
    /// Rounds attempted so far, failed ones included.
    pub fn rounds(&self) -> u64 { self.round }
    pub fn last_export(&self) -> Option<&Arc<Export>> { self.last_export.as_ref() }

    /// Runs one complete round.
    pub fn step(&mut self) -> Result<RoundReport, RoundFailure> {
        let round = self.round;
        self.round += 1;

        self.phases.advance();
        let mut neighbors: BTreeSet<DeviceId> = self.wiring.topology.neighbors(&self.id);
        neighbors.remove(&self.id);
        self.wiring.exchange.collect();
        let inbox = self.wiring.exchange.inbox();
        let now = Instant::now();
        inbox.evict_stale(now);
        let snapshot = inbox.snapshot(&neighbors, now);

        self.phases.advance();
        let started = std::time::Instant::now();
        let inputs = RoundInputs { device: &self.id, sensors: &*self.wiring.sensors, state: &self.state, neighbors: &snapshot };
        let outcome = evaluate(&self.program, &inputs);
        ROUND_METRICS.evaluation_latency_ms.observe(started.elapsed().as_secs_f64() * 1000.0);

        let evaluation = match outcome {
            Ok(e) => e,
            Err(e) => {
                self.phases.abort();
                let failure = RoundFailure { device: self.id.clone(), round, path: e.path, kind: e.kind };
                ROUND_METRICS.round_failures_total.with_label_values(&[failure.kind.label()]).inc();
                warn!(device = %self.id, round, path = %failure.path, kind = %failure.kind, "round_abandoned");
                self.wiring.actuator.report_failure(&failure);
                return Err(failure);
            }
        };

        self.phases.advance();
        self.state.absorb(&evaluation.export);
        let export = Arc::new(evaluation.export);
        let published = self.publish(round, &export, &neighbors);
        let report = RoundReport { device: self.id.clone(), round, value: evaluation.value, export, neighbors: snapshot.len(), published };
        self.wiring.actuator.actuate(&report);
        self.phases.advance();

        ROUND_METRICS.rounds_total.inc();
        debug!(device = %self.id, round, phases = ?self.phases.durations(), "round_completed");
        Ok(report)
    }

    /// Unchanged exports go out only every `republish_every` rounds. The last
    /// export and the heartbeat counter move only once the exchange accepted
    /// the message, so a failed publish is retried next round.
    fn publish(&mut self, round: u64, export: &Arc<Export>, neighbors: &BTreeSet<DeviceId>) -> bool {
        let changed = self.last_export.as_deref() != Some(&**export);
        let due = self.rounds_since_publish + 1 >= self.config.republish_every.max(1);
        if !changed && !due {
            self.rounds_since_publish += 1;
            ROUND_METRICS.exports_suppressed_total.inc();
            return false;
        }
        let message = Arc::new(NeighborMessage {
            from: self.id.clone(),
            round,
            sent_at: chrono::Utc::now(),
            export: export.clone(),
        });
        if let Err(e) = self.wiring.exchange.publish(message, neighbors) {
            warn!(device = %self.id, round, error = %e, "publish_failed");
            return false;
        }
        self.last_export = Some(export.clone());
        self.rounds_since_publish = 0;
        ROUND_METRICS.exports_published_total.inc();
        debug!(device = %self.id, round, recipients = neighbors.len(), "round_published");
        true
    }

    /// Paces rounds until `stop` turns true or its sender goes away. The stop
    /// request is seen only between rounds.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Self {
        let mut ticker = tokio::time::interval(self.config.round_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(device = %self.id, interval_ms = self.config.round_interval_ms, "driver_started");
        loop {
            tokio::select! {
                _ = ticker.tick() => { let _ = self.step(); }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
            }
        }
        self.phases.stop();
        info!(device = %self.id, rounds = self.round, "driver_stopped");
        self
    }

    pub fn spawn(self) -> DeviceHandle {
        let (tx, rx) = watch::channel(false);
        let device = self.id.clone();
        DeviceHandle { device, stop: tx, task: tokio::spawn(self.run(rx)) }
    }
}

/// A driver running on its own task.
pub struct DeviceHandle {
    device: DeviceId,
    stop: watch::Sender<bool>,
    task: JoinHandle<RoundDriver>,
}

impl DeviceHandle {
    pub fn device(&self) -> &DeviceId { &self.device }

    /// Requests a stop and waits for the current round to finish.
    pub async fn stop(self) -> Result<RoundDriver, tokio::task::JoinError> {
        let _ = self.stop.send(true);
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::actuator::FieldRecorder;
    use crate::exchange::{ExchangeError, LocalHub};
    use crate::sim::SharedSensors;
    use crate::table::NeighborTable;
    use crate::topology::StaticTopology;
    use field_core::{Builtin, SensorMap};

    fn driver(program: Expr, sensors: SensorMap, config: DriverConfig) -> (RoundDriver, Arc<FieldRecorder>) {
        let hub = LocalHub::new();
        let id = DeviceId::new("solo");
        let recorder = Arc::new(FieldRecorder::new());
        let wiring = Wiring {
            sensors: Arc::new(sensors),
            topology: Arc::new(StaticTopology::new()),
            exchange: Arc::new(hub.join(id.clone())),
            actuator: recorder.clone(),
        };
        (RoundDriver::new(id, Arc::new(program), config, wiring), recorder)
    }

    #[test]
    fn state_persists_across_rounds() {
        let counter = Expr::rep(Expr::lit(0), "x", Expr::call(Builtin::Add, vec![Expr::var("x"), Expr::lit(1)]));
        let (mut d, recorder) = driver(counter, SensorMap::new(), DriverConfig::default());
        for _ in 0..5 { d.step().unwrap(); }
        assert_eq!(recorder.value(&DeviceId::new("solo")), Some(Value::Number(4.0)));
        assert_eq!(d.phase(), RoundPhase::Idle);
    }

    #[test]
    fn failed_round_changes_nothing() {
        let program = Expr::rep(Expr::lit(0), "x", Expr::call(Builtin::Add, vec![Expr::var("x"), Expr::sense("bump")]));
        let (mut d, recorder) = driver(program, SensorMap::new().with("bump", 1), DriverConfig::default());
        d.step().unwrap();
        let before = d.state().clone();
        let exported = d.last_export().cloned();

        d.wiring.sensors = Arc::new(SensorMap::new());
        let failure = d.step().unwrap_err();
        assert_eq!(failure.kind, ErrorKind::SensorUnavailable("bump".into()));
        assert_eq!(failure.round, 1);
        assert_eq!(d.state(), &before);
        assert_eq!(d.last_export().cloned(), exported);
        assert_eq!(recorder.view(&DeviceId::new("solo")).unwrap().failures, 1);
        assert_eq!(d.phase(), RoundPhase::Idle);
    }

    #[test]
    fn unchanged_exports_are_throttled() {
        let config = DriverConfig { republish_every: 3, ..DriverConfig::default() };
        let (mut d, _) = driver(Expr::lit(1), SensorMap::new(), config);
        let published: Vec<bool> = (0..7).map(|_| d.step().unwrap().published).collect();
        assert_eq!(published, vec![true, false, false, true, false, false, true]);
    }

    /// Exchange whose publish can be made to fail.
    #[derive(Debug)]
    struct FlakyExchange {
        id: DeviceId,
        failing: AtomicBool,
        sent: AtomicUsize,
        inbox: NeighborTable,
    }

    impl Exchange for FlakyExchange {
        fn device(&self) -> &DeviceId { &self.id }

        fn publish(&self, _message: Arc<NeighborMessage>, _recipients: &BTreeSet<DeviceId>) -> Result<(), ExchangeError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ExchangeError::Transport("link down".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn inbox(&self) -> &NeighborTable { &self.inbox }
    }

    #[test]
    fn failed_publish_is_retried_next_round() {
        let id = DeviceId::new("solo");
        let exchange = Arc::new(FlakyExchange { id: id.clone(), failing: AtomicBool::new(false), sent: AtomicUsize::new(0), inbox: NeighborTable::new() });
        let sensors = SharedSensors::new(SensorMap::new().with("v", 1));
        let wiring = Wiring {
            sensors: Arc::new(sensors.clone()),
            topology: Arc::new(StaticTopology::new()),
            exchange: exchange.clone(),
            actuator: Arc::new(FieldRecorder::new()),
        };
        let config = DriverConfig { republish_every: 5, ..DriverConfig::default() };
        let mut d = RoundDriver::new(id, Arc::new(Expr::sense("v")), config, wiring);

        assert!(d.step().unwrap().published);
        let first = d.last_export().cloned();

        exchange.failing.store(true, Ordering::SeqCst);
        sensors.set("v", 2);
        assert!(!d.step().unwrap().published);
        assert_eq!(d.last_export().cloned(), first);

        exchange.failing.store(false, Ordering::SeqCst);
        let report = d.step().unwrap();
        assert!(report.published);
        assert_eq!(d.last_export(), Some(&report.export));
        assert_eq!(exchange.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lands_between_rounds() {
        let (d, recorder) = driver(Expr::lit(2), SensorMap::new(), DriverConfig { round_interval_ms: 10, ..DriverConfig::default() });
        let handle = d.spawn();
        tokio::time::sleep(std::time::Duration::from_millis(35)).await;
        let d = handle.stop().await.unwrap();
        assert_eq!(d.phase(), RoundPhase::Stopped);
        assert!(d.rounds() >= 3);
        assert_eq!(recorder.value(&DeviceId::new("solo")), Some(Value::Number(2.0)));
    }
}
