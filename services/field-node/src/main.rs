use std::sync::Arc;

use anyhow::{Context, Result};
use field_core::DeviceId;
use field_runtime::{
    exchange::{NatsExchange, PeerDirectory},
    health::{self, HealthState},
    init_tracing, load_config,
    retry::{retry_async, Backoff},
    Actuator, FieldRecorder, LogActuator, RoundDriver, RoundFailure, RoundReport, Wiring,
};
use tracing::info;

/// Logs outcomes and keeps the latest one for `/status`.
struct NodeActuator {
    recorder: Arc<FieldRecorder>,
}

impl Actuator for NodeActuator {
    fn actuate(&self, report: &RoundReport) {
        LogActuator.actuate(report);
        self.recorder.actuate(report);
    }

    fn report_failure(&self, failure: &RoundFailure) {
        LogActuator.report_failure(failure);
        self.recorder.report_failure(failure);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("field-node")?;
    let cfg = load_config("field-node")?;
    let device = DeviceId::new(cfg.device_id.clone().unwrap_or_else(|| format!("node-{}", uuid::Uuid::new_v4().simple())));
    let program = cfg.resolve_program()?;
    info!(target: "field-node", %device, nats_url = %cfg.nats_url, prefix = %cfg.subject_prefix, program = %cfg.program, "starting_field_node");

    let recorder = Arc::new(FieldRecorder::new());
    health::start_health_server(cfg.health_port, HealthState { device: device.clone(), recorder: recorder.clone() }).await?;

    let url = cfg.nats_url.clone();
    let client = retry_async(&Backoff::default(), "nats_connect", |_| async_nats::connect(url.clone()))
        .await
        .context("connecting to NATS")?;

    let peers = PeerDirectory::new(device.clone(), cfg.peer_ttl());
    peers.spawn(client.clone(), &cfg.subject_prefix, cfg.hello_interval()).await?;
    let exchange = NatsExchange::connect(client, &cfg.subject_prefix, device.clone(), cfg.driver.staleness()).await?;

    let wiring = Wiring {
        sensors: Arc::new(cfg.sensor_map()),
        topology: Arc::new(peers),
        exchange: Arc::new(exchange),
        actuator: Arc::new(NodeActuator { recorder }),
    };
    let handle = RoundDriver::new(device, Arc::new(program), cfg.driver.clone(), wiring).spawn();
    health::mark_ready();

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");
    health::clear_ready();
    let driver = handle.stop().await?;
    info!(rounds = driver.rounds(), "field_node_stopped");
    Ok(())
}
