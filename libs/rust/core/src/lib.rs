//! Field calculus evaluation core.
//!
//! A device evaluates an aggregate program ([`Expr`]) once per round against
//! its sensors, its own remembered state and the latest exports of its
//! neighbors. The result is a local [`Value`] plus an [`Export`] keyed by
//! structural [`Path`], which neighbors read on their next round.
//!
//! This crate is transport-agnostic and synchronous; pacing rounds and moving
//! exports between devices lives in `field-runtime`.

pub mod ast;
pub mod builtins;
pub mod context;
pub mod error;
pub mod export;
pub mod interpreter;
pub mod path;
pub mod programs;
pub mod sensors;
pub mod value;

pub use ast::{Expr, Lambda};
pub use builtins::Builtin;
pub use context::{Context, Focus, NeighborSnapshot, RoundInputs};
pub use error::{ErrorKind, EvalError};
pub use export::{DeviceId, DeviceState, Export, ExportBuilder};
pub use interpreter::{evaluate, evaluate_in, Evaluation};
pub use path::{CodeId, Path, Slot, SlotKind};
pub use sensors::{SensorMap, Sensors};
pub use value::{Closure, Env, Function, Value};
