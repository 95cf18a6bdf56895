use std::{collections::BTreeSet, sync::Arc, time::Duration};

use field_core::{programs, DeviceId, ExportBuilder, SensorMap, Value};
use field_runtime::{
    exchange::{ChannelHub, LocalHub},
    DriverConfig, Exchange, FieldRecorder, NeighborMessage, RoundDriver, Simulation, StaticTopology, Wiring,
};

fn id(s: &str) -> DeviceId { DeviceId::new(s) }

fn line() -> Arc<StaticTopology> {
    let topo = StaticTopology::new();
    topo.link(&id("a"), &id("b"));
    topo.link(&id("b"), &id("c"));
    Arc::new(topo)
}

fn sensors(source: bool) -> Arc<SensorMap> { Arc::new(SensorMap::new().with("source", source)) }

#[test]
fn drivers_converge_over_channels() {
    let hub = ChannelHub::new();
    let topo = line();
    let recorder = Arc::new(FieldRecorder::new());
    let program = Arc::new(programs::hop_gradient("source"));
    let mut drivers: Vec<RoundDriver> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let wiring = Wiring {
                sensors: sensors(name == "a"),
                topology: topo.clone(),
                exchange: Arc::new(hub.join(id(name))),
                actuator: recorder.clone(),
            };
            RoundDriver::new(id(name), program.clone(), DriverConfig::default(), wiring)
        })
        .collect();
    // Reverse order is the slowest case for a source at the front.
    for _ in 0..10 {
        for d in drivers.iter_mut().rev() { d.step().unwrap(); }
    }
    let field: Vec<Value> = recorder.field().into_values().collect();
    assert_eq!(field, vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]);
}

#[tokio::test(start_paused = true)]
async fn stale_neighbors_drop_out() {
    let config = DriverConfig { staleness_ms: 500, ..DriverConfig::default() };
    let hub = LocalHub::with_staleness(config.staleness());
    let topo = line();
    let recorder = Arc::new(FieldRecorder::new());
    let program = Arc::new(programs::hop_gradient("source"));
    let mk = |name: &str, source: bool| {
        let wiring = Wiring { sensors: sensors(source), topology: topo.clone(), exchange: Arc::new(hub.join(id(name))), actuator: recorder.clone() };
        RoundDriver::new(id(name), program.clone(), config.clone(), wiring)
    };
    let mut a = mk("a", true);
    let mut b = mk("b", false);
    for _ in 0..4 {
        a.step().unwrap();
        b.step().unwrap();
    }
    assert_eq!(recorder.value(&id("b")), Some(Value::Number(1.0)));

    // a goes quiet; its last export ages out of b's table.
    tokio::time::advance(Duration::from_millis(600)).await;
    let report = b.step().unwrap();
    assert_eq!(report.neighbors, 0);
    assert_eq!(report.value, Value::Number(f64::INFINITY));
}

#[tokio::test(start_paused = true)]
async fn spawned_devices_converge() {
    let topo = StaticTopology::line(3);
    let config = DriverConfig { round_interval_ms: 20, ..DriverConfig::default() };
    let sim = Simulation::new(programs::hop_gradient("source"), topo, config);
    sim.set_sensor_all("source", false);
    sim.set_sensor(&id("d0"), "source", true);
    let running = sim.spawn();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let field: Vec<Value> = running.field().into_values().collect();
    assert_eq!(field, vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]);

    running.sensors(&id("d0")).unwrap().set("source", false);
    running.sensors(&id("d2")).unwrap().set("source", true);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(running.value(&id("d0")), Some(Value::Number(2.0)));

    let drivers = running.stop().await.unwrap();
    assert_eq!(drivers.len(), 3);
    assert!(drivers.iter().all(|d| d.rounds() >= 20));
}

#[test]
fn latest_reflects_last_delivery() {
    let hub = LocalHub::new();
    let a = hub.join(id("a"));
    let b = hub.join(id("b"));
    let to_b: BTreeSet<DeviceId> = [id("b")].into_iter().collect();
    for round in 0..3 {
        let msg = NeighborMessage::new(id("a"), round, ExportBuilder::new().finish(Value::Number(round as f64)));
        a.publish(Arc::new(msg), &to_b).unwrap();
    }
    assert_eq!(b.latest(&id("a")).map(|m| m.round), Some(2));
}

#[tokio::test(start_paused = true)]
async fn latest_forgets_a_quiet_sender() {
    let hub = ChannelHub::with_staleness(Duration::from_millis(500));
    let a = hub.join(id("a"));
    let b = hub.join(id("b"));
    let to_b: BTreeSet<DeviceId> = [id("b")].into_iter().collect();
    let msg = NeighborMessage::new(id("a"), 0, ExportBuilder::new().finish(Value::Number(0.0)));
    a.publish(Arc::new(msg), &to_b).unwrap();
    b.collect();
    assert!(b.latest(&id("a")).is_some());

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(b.latest(&id("a")).is_none());
}
