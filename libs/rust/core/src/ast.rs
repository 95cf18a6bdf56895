//! Program representation.
//!
//! `Expr` is a closed set of node kinds; the interpreter matches on it
//! exhaustively. Programs serialize with serde, so they can be shipped as
//! YAML/JSON files and loaded identically on every device.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::builtins::Builtin;
use crate::path::CodeId;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    VariableRef(String),
    /// Local sensor reading.
    Sense(String),
    /// Sensor reading relative to the neighbor in focus (self when evaluating locally).
    NeighborSense(String),
    SelfId,
    Lambda(Lambda),
    Apply { function: Box<Expr>, args: Vec<Expr> },
    Let { name: String, value: Box<Expr>, body: Box<Expr> },
    Branch { condition: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    /// State carried across rounds: `init` on first visit, then `update` with
    /// `var` bound to last round's value.
    Rep { init: Box<Expr>, var: String, update: Box<Expr> },
    /// Neighbor field access; only meaningful inside a `NeighborFold` generator.
    Nbr(Box<Expr>),
    NeighborFold {
        default: Box<Expr>,
        accumulator: Box<Expr>,
        generator: Box<Expr>,
        include_self: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub code: CodeId,
    pub params: Vec<String>,
    pub body: Arc<Expr>,
}

impl Lambda {
    pub fn new(params: &[&str], body: Expr) -> Self {
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        let code = code_digest(&params, &body);
        Self { code, params, body: Arc::new(body) }
    }
}

/// Digest of the bincode encoding, which is identical on every device
/// running the same crate version.
fn code_digest(params: &[String], body: &Expr) -> CodeId {
    let mut h = Sha256::new();
    // Writing derived Serialize impls into a hasher cannot fail.
    let _ = bincode::serialize_into(&mut h, &(params, body));
    CodeId(hex::encode(&h.finalize()[..8]))
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Self { Expr::Literal(value.into()) }
    pub fn var(name: impl Into<String>) -> Self { Expr::VariableRef(name.into()) }
    pub fn sense(name: impl Into<String>) -> Self { Expr::Sense(name.into()) }
    pub fn nbr_sense(name: impl Into<String>) -> Self { Expr::NeighborSense(name.into()) }

    pub fn apply(function: Expr, args: Vec<Expr>) -> Self {
        Expr::Apply { function: Box::new(function), args }
    }

    pub fn call(builtin: Builtin, args: Vec<Expr>) -> Self { Expr::apply(Expr::lit(builtin), args) }

    pub fn lambda(params: &[&str], body: Expr) -> Self { Expr::Lambda(Lambda::new(params, body)) }

    pub fn let_in(name: impl Into<String>, value: Expr, body: Expr) -> Self {
        Expr::Let { name: name.into(), value: Box::new(value), body: Box::new(body) }
    }

    pub fn branch(condition: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Branch { condition: Box::new(condition), then: Box::new(then), otherwise: Box::new(otherwise) }
    }

    pub fn rep(init: Expr, var: impl Into<String>, update: Expr) -> Self {
        Expr::Rep { init: Box::new(init), var: var.into(), update: Box::new(update) }
    }

    pub fn nbr(body: Expr) -> Self { Expr::Nbr(Box::new(body)) }

    /// Fold over neighbors with this device's own value included.
    pub fn fold(default: Expr, accumulator: Expr, generator: Expr) -> Self {
        Expr::NeighborFold { default: Box::new(default), accumulator: Box::new(accumulator), generator: Box::new(generator), include_self: true }
    }

    /// Fold over neighbors only.
    pub fn fold_plus(default: Expr, accumulator: Expr, generator: Expr) -> Self {
        Expr::NeighborFold { default: Box::new(default), accumulator: Box::new(accumulator), generator: Box::new(generator), include_self: false }
    }

    /// Number of nodes in the tree, used for logging program size.
    pub fn size(&self) -> usize {
        1 + match self {
            Expr::Literal(_) | Expr::VariableRef(_) | Expr::Sense(_) | Expr::NeighborSense(_) | Expr::SelfId => 0,
            Expr::Lambda(l) => l.body.size(),
            Expr::Apply { function, args } => function.size() + args.iter().map(Expr::size).sum::<usize>(),
            Expr::Let { value, body, .. } => value.size() + body.size(),
            Expr::Branch { condition, then, otherwise } => condition.size() + then.size() + otherwise.size(),
            Expr::Rep { init, update, .. } => init.size() + update.size(),
            Expr::Nbr(body) => body.size(),
            Expr::NeighborFold { default, accumulator, generator, .. } => default.size() + accumulator.size() + generator.size(),
        }
    }
}
