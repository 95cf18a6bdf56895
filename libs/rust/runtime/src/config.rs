//! Layered configuration: built-in defaults, then an optional YAML file named
//! by `FIELD_CONFIG_FILE`, then `FIELD__*` environment variables.

use std::{collections::BTreeMap, path::{Path, PathBuf}, time::Duration};

use field_core::{programs, Expr, SensorMap, Value};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("reading program file {path}: {source}")]
    ProgramIo { path: PathBuf, source: std::io::Error },
    #[error("parsing program file {path}: {source}")]
    ProgramParse { path: PathBuf, source: ProgramError },
    #[error("unknown program `{0}`")]
    UnknownProgram(String),
    #[error("invalid driver settings: {0}")]
    InvalidDriver(String),
}

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pacing and exchange policy of one round driver.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    pub round_interval_ms: u64,
    /// Neighbor exports older than this are treated as absent.
    pub staleness_ms: u64,
    /// An unchanged export is still republished every this many rounds.
    pub republish_every: u32,
}

impl Default for DriverConfig {
    fn default() -> Self { Self { round_interval_ms: 200, staleness_ms: 2_000, republish_every: 5 } }
}

impl DriverConfig {
    pub fn round_interval(&self) -> Duration { Duration::from_millis(self.round_interval_ms) }
    pub fn staleness(&self) -> Duration { Duration::from_millis(self.staleness_ms) }

    /// A converged device publishes only every `republish_every` rounds, so
    /// that gap must fit inside the neighbors' staleness window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round_interval_ms == 0 {
            return Err(ConfigError::InvalidDriver("round_interval_ms must be positive".into()));
        }
        let quiet_ms = self.round_interval_ms.saturating_mul(u64::from(self.republish_every.max(1)));
        if quiet_ms >= self.staleness_ms {
            return Err(ConfigError::InvalidDriver(format!(
                "round_interval_ms * republish_every ({quiet_ms}) must be below staleness_ms ({})",
                self.staleness_ms
            )));
        }
        Ok(())
    }
}

/// Sensor value as written in configuration files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SensorSetting {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<SensorSetting> for Value {
    fn from(s: SensorSetting) -> Self {
        match s {
            SensorSetting::Bool(b) => Value::Bool(b),
            SensorSetting::Number(n) => Value::Number(n),
            SensorSetting::Text(t) => Value::Text(t),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub device_id: Option<String>,
    pub nats_url: String,
    pub subject_prefix: String,
    pub health_port: u16,
    pub hello_interval_ms: u64,
    /// Peers not heard from within this window drop out of the neighbor set.
    pub peer_ttl_ms: u64,
    /// Name from the program library, used when `program_file` is unset.
    pub program: String,
    pub program_file: Option<PathBuf>,
    pub source_sensor: String,
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorSetting>,
    pub driver: DriverConfig,
}

impl NodeConfig {
    pub fn hello_interval(&self) -> Duration { Duration::from_millis(self.hello_interval_ms) }
    pub fn peer_ttl(&self) -> Duration { Duration::from_millis(self.peer_ttl_ms) }

    pub fn sensor_map(&self) -> SensorMap {
        self.sensors.iter().fold(SensorMap::new(), |map, (name, v)| map.with(name.clone(), Value::from(v.clone())))
    }

    /// The program this node runs: the file if one is configured, otherwise
    /// the named library program.
    pub fn resolve_program(&self) -> Result<Expr, ConfigError> {
        match &self.program_file {
            Some(path) => load_program(path),
            None => programs::by_name(&self.program, &self.source_sensor).ok_or_else(|| ConfigError::UnknownProgram(self.program.clone())),
        }
    }
}

pub fn load_config(service: &str) -> Result<NodeConfig, ConfigError> {
    let defaults = DriverConfig::default();
    let mut builder = config::Config::builder()
        .set_default("nats_url", "127.0.0.1:4222")?
        .set_default("subject_prefix", "field")?
        .set_default("health_port", 8080)?
        .set_default("hello_interval_ms", 1_000)?
        .set_default("peer_ttl_ms", 5_000)?
        .set_default("program", "hop_gradient")?
        .set_default("source_sensor", "source")?
        .set_default("driver.round_interval_ms", defaults.round_interval_ms)?
        .set_default("driver.staleness_ms", defaults.staleness_ms)?
        .set_default("driver.republish_every", defaults.republish_every)?;
    if let Ok(file) = std::env::var("FIELD_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("FIELD").separator("__"));
    let cfg: NodeConfig = builder.build()?.try_deserialize()?;
    cfg.driver.validate()?;
    tracing::debug!(service, program = %cfg.program, "config_loaded");
    Ok(cfg)
}

/// On-disk encodings of a program.
///
/// YAML writes enum variants as single-key maps (`Rep: {init: ...}`) and
/// keeps `.inf` literals. JSON has no infinity, so JSON programs must stick
/// to finite literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramFormat { Yaml, Json }

impl ProgramFormat {
    /// `.json` files are JSON; anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ProgramFormat::Json,
            _ => ProgramFormat::Yaml,
        }
    }
}

pub fn load_program(path: &Path) -> Result<Expr, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProgramIo { path: path.to_path_buf(), source })?;
    parse_program(&text, ProgramFormat::from_path(path)).map_err(|source| ConfigError::ProgramParse { path: path.to_path_buf(), source })
}

pub fn parse_program(text: &str, format: ProgramFormat) -> Result<Expr, ProgramError> {
    match format {
        ProgramFormat::Json => Ok(serde_json::from_str(text)?),
        ProgramFormat::Yaml => Ok(serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(text))?),
    }
}

pub fn render_program(program: &Expr, format: ProgramFormat) -> Result<String, ProgramError> {
    match format {
        ProgramFormat::Json => Ok(serde_json::to_string_pretty(program)?),
        ProgramFormat::Yaml => {
            let mut buf = Vec::new();
            serde_yaml::with::singleton_map_recursive::serialize(program, &mut serde_yaml::Serializer::new(&mut buf))?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}
