//! Runtime around `field-core`: per-device round drivers, neighbor exchange
//! over in-process hubs, channels or NATS, plus the configuration, logging
//! and metrics shared by the binaries.

pub mod actuator;
pub mod config;
pub mod driver;
pub mod exchange;
pub mod health;
pub mod metrics;
pub mod phase;
pub mod retry;
pub mod sim;
pub mod table;
pub mod telemetry;
pub mod topology;

pub use actuator::{Actuator, DeviceView, FieldRecorder, LogActuator};
pub use config::{load_config, load_program, parse_program, render_program, ConfigError, DriverConfig, NodeConfig, ProgramError, ProgramFormat};
pub use driver::{DeviceHandle, RoundDriver, RoundFailure, RoundReport, Wiring};
pub use exchange::{Exchange, ExchangeError, NeighborMessage};
pub use phase::RoundPhase;
pub use sim::{RunningSimulation, SharedSensors, Simulation};
pub use table::NeighborTable;
pub use telemetry::init_tracing;
pub use topology::{StaticTopology, Topology};
