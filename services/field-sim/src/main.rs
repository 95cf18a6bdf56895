use anyhow::{bail, Result};
use field_core::{programs, DeviceId, Value};
use field_runtime::{init_tracing, topology, DriverConfig, Simulation, StaticTopology};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SimConfig {
    /// `line` or `grid`.
    topology: String,
    width: usize,
    height: usize,
    rounds: usize,
    program: String,
    /// Index of the device whose `source` sensor is true.
    source: usize,
}

fn load() -> Result<SimConfig> {
    let cfg = config::Config::builder()
        .set_default("topology", "line")?
        .set_default("width", 5)?
        .set_default("height", 1)?
        .set_default("rounds", 10)?
        .set_default("program", "hop_gradient")?
        .set_default("source", 0)?
        .add_source(config::Environment::with_prefix("FIELD_SIM").separator("__"))
        .build()?;
    Ok(cfg.try_deserialize()?)
}

fn render(v: &Value) -> String {
    match v {
        Value::Number(n) if n.is_infinite() => "inf".into(),
        other => other.to_string(),
    }
}

fn main() -> Result<()> {
    init_tracing("field-sim")?;
    let cfg = load()?;
    let topo = match cfg.topology.as_str() {
        "line" => StaticTopology::line(cfg.width),
        "grid" => StaticTopology::grid(cfg.width, cfg.height),
        other => bail!("unknown topology `{other}`"),
    };
    let Some(program) = programs::by_name(&cfg.program, "source") else { bail!("unknown program `{}`", cfg.program) };
    info!(target: "field-sim", topology = %cfg.topology, width = cfg.width, height = cfg.height, program = %cfg.program, "starting_simulation");

    let mut sim = Simulation::new(program, topo, DriverConfig::default());
    sim.set_sensor_all("source", false);
    sim.set_sensor_all("value", 0.0);
    sim.set_sensor_all("region", true);
    sim.set_sensor(&topology::device(cfg.source), "source", true);
    sim.set_sensor(&topology::device(cfg.source), "value", 1.0);
    // Unit range between every pair, zero to self, for the metric gradient.
    let ids: Vec<DeviceId> = sim.devices().cloned().collect();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i..] { sim.set_distance("range", a, b, if a == b { 0.0 } else { 1.0 }); }
    }

    let count = if cfg.topology == "grid" { cfg.width * cfg.height } else { cfg.width };
    for round in 0..cfg.rounds {
        let failures = sim.step_all().into_iter().filter(|r| r.is_err()).count();
        println!("round {round} ({failures} failed)");
        let field = sim.field();
        let cells: Vec<String> = (0..count)
            .map(|i| field.get(&topology::device(i)).map(render).unwrap_or_else(|| "-".into()))
            .collect();
        for row in cells.chunks(cfg.width.max(1)) { println!("  {}", row.join("\t")); }
    }
    Ok(())
}
