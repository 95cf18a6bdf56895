//! Tree-walking interpreter.
//!
//! Evaluation is a pure function of the program and the round inputs: no
//! clocks, no randomness, neighbors visited in id order. While walking, the
//! interpreter records the values neighbors need (branch results, rep
//! results, fold results, nbr values and the root) into this round's export.

use tracing::trace;

use crate::ast::Expr;
use crate::context::{Context, Focus, RoundInputs};
use crate::error::{ErrorKind, EvalError};
use crate::export::{Export, ExportBuilder};
use crate::path::{Path, Slot};
use crate::value::{Closure, Function, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    pub export: Export,
}

/// Evaluates `program` for one round.
pub fn evaluate(program: &Expr, inputs: &RoundInputs<'_>) -> Result<Evaluation, EvalError> {
    evaluate_in(program, &Context::root(inputs))
}

/// Evaluates `program` in an explicit context, which must be locally focused.
pub fn evaluate_in(program: &Expr, ctx: &Context<'_>) -> Result<Evaluation, EvalError> {
    let mut machine = Machine { export: ExportBuilder::new() };
    let value = machine.eval(program, ctx, &mut SlotCounter::default()).map_err(|interrupt| match interrupt {
        Interrupt::Failed(err) => err,
        Interrupt::Absent(path) => EvalError::new(ErrorKind::UnalignedRead, path),
    })?;
    Ok(Evaluation { export: machine.export.finish(value.clone()), value })
}

/// Hands out occurrence indices for slots opened at one level.
#[derive(Debug, Default)]
struct SlotCounter(u32);

impl SlotCounter {
    fn next(&mut self) -> u32 {
        let i = self.0;
        self.0 += 1;
        i
    }
}

enum Interrupt {
    Failed(EvalError),
    /// The neighbor in focus has no value at this path.
    Absent(Path),
}

fn fail(kind: ErrorKind, ctx: &Context<'_>) -> Interrupt {
    Interrupt::Failed(EvalError::new(kind, ctx.path().clone()))
}

struct Machine {
    export: ExportBuilder,
}

impl Machine {
    fn record(&mut self, ctx: &Context<'_>, value: &Value) {
        if ctx.is_recording() { self.export.put(ctx.path().clone(), value.clone()); }
    }

    fn eval(&mut self, expr: &Expr, ctx: &Context<'_>, slots: &mut SlotCounter) -> Result<Value, Interrupt> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::VariableRef(name) => ctx.lookup(name).map_err(|k| fail(k, ctx)),
            Expr::Sense(name) => ctx.sense(name).map_err(|k| fail(k, ctx)),
            Expr::NeighborSense(name) => ctx.neighbor_sense(name).map_err(|k| fail(k, ctx)),
            Expr::SelfId => Ok(Value::Text(ctx.device().to_string())),
            Expr::Lambda(lambda) => Ok(Value::Function(Function::Closure(Closure::capture(lambda, ctx.env().clone())))),
            Expr::Let { name, value, body } => {
                let bound = self.eval(value, ctx, slots)?;
                self.eval(body, &ctx.bind(name, bound), slots)
            }
            Expr::Apply { function, args } => {
                let f = self.eval(function, ctx, slots)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args { values.push(self.eval(arg, ctx, slots)?); }
                self.apply(&f, values, ctx, slots)
            }
            Expr::Branch { condition, then, otherwise } => {
                let taken = self.eval(condition, ctx, slots)?.as_bool().map_err(|k| fail(k, ctx))?;
                let inner = ctx.nest(Slot::Branch { index: slots.next(), taken });
                let side = if taken { then } else { otherwise };
                let value = self.eval(side, &inner, &mut SlotCounter::default())?;
                self.record(&inner, &value);
                Ok(value)
            }
            Expr::Rep { init, var, update } => {
                let inner = ctx.nest(Slot::Rep(slots.next()));
                let value = match inner.remembered() {
                    Some(previous) => self.eval(update, &inner.bind(var, previous.clone()), &mut SlotCounter::default())?,
                    None => self.eval(init, &inner, &mut SlotCounter::default())?,
                };
                self.record(&inner, &value);
                Ok(value)
            }
            Expr::Nbr(body) => {
                let inner = ctx.nest(Slot::Nbr(slots.next()));
                match ctx.focus() {
                    Focus::Neighbor { export, .. } => {
                        export.get(inner.path()).cloned().ok_or_else(|| Interrupt::Absent(inner.path().clone()))
                    }
                    Focus::Local => {
                        let value = self.eval(body, &inner, &mut SlotCounter::default())?;
                        self.record(&inner, &value);
                        Ok(value)
                    }
                }
            }
            Expr::NeighborFold { default, accumulator, generator, include_self } => {
                let initial = self.eval(default, ctx, slots)?;
                let combine = self.eval(accumulator, ctx, slots)?;
                let inner = ctx.nest(Slot::FoldHood(slots.next()));
                self.fold(initial, &combine, generator, *include_self, &inner)
            }
        }
    }

    fn fold(&mut self, initial: Value, combine: &Value, generator: &Expr, include_self: bool, ctx: &Context<'_>) -> Result<Value, Interrupt> {
        // The local pass always runs so that nbr values inside the generator
        // reach this round's export, even when self does not contribute.
        let local = ctx.local();
        let own = self.eval(generator, &local, &mut SlotCounter::default())?;
        let quiet = ctx.silent();
        let mut acc = initial;
        if include_self {
            acc = self.apply(combine, vec![acc, own], &quiet, &mut SlotCounter::default())?;
        }
        for (id, export) in ctx.aligned_neighbors() {
            let focused = local.focused_on(id, export);
            match self.eval(generator, &focused, &mut SlotCounter::default()) {
                Ok(contribution) => {
                    acc = self.apply(combine, vec![acc, contribution], &quiet, &mut SlotCounter::default())?;
                }
                Err(Interrupt::Absent(path)) => {
                    trace!(neighbor = %id, %path, "neighbor_value_absent");
                }
                Err(failed) => return Err(failed),
            }
        }
        self.record(ctx, &acc);
        Ok(acc)
    }

    fn apply(&mut self, f: &Value, args: Vec<Value>, ctx: &Context<'_>, slots: &mut SlotCounter) -> Result<Value, Interrupt> {
        match f {
            Value::Function(Function::Builtin(builtin)) => builtin.call(args).map_err(|k| fail(k, ctx)),
            Value::Function(Function::Closure(closure)) => {
                if closure.params.len() != args.len() {
                    return Err(fail(ErrorKind::ArityMismatch { expected: closure.params.len(), found: args.len() }, ctx));
                }
                let env = closure.env.extend(closure.params.iter().cloned().zip(args));
                let inner = ctx.nest(Slot::FunCall { index: slots.next(), code: closure.code.clone() }).with_env(env);
                self.eval(&closure.body, &inner, &mut SlotCounter::default())
            }
            other => Err(fail(ErrorKind::mismatch("function", other), ctx)),
        }
    }
}
