//! Pure built-in operators.

use std::cmp::Ordering;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Add, Sub, Mul, Div, Neg, Abs,
    Min, Max,
    Eq, Neq, Lt, Le, Gt, Ge,
    And, Or, Not,
    Mux,
    Tuple, Get,
    Concat,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Add => "add",
            Builtin::Sub => "sub",
            Builtin::Mul => "mul",
            Builtin::Div => "div",
            Builtin::Neg => "neg",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Eq => "eq",
            Builtin::Neq => "neq",
            Builtin::Lt => "lt",
            Builtin::Le => "le",
            Builtin::Gt => "gt",
            Builtin::Ge => "ge",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Not => "not",
            Builtin::Mux => "mux",
            Builtin::Tuple => "tuple",
            Builtin::Get => "get",
            Builtin::Concat => "concat",
        }
    }

    /// Fixed argument count; `None` for variadic operators.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Builtin::Tuple => None,
            Builtin::Neg | Builtin::Abs | Builtin::Not => Some(1),
            Builtin::Mux => Some(3),
            _ => Some(2),
        }
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value, ErrorKind> {
        if let Some(expected) = self.arity() {
            if args.len() != expected { return Err(ErrorKind::ArityMismatch { expected, found: args.len() }); }
        }
        match self {
            Builtin::Add => numeric(&args, |a, b| a + b),
            Builtin::Sub => numeric(&args, |a, b| a - b),
            Builtin::Mul => numeric(&args, |a, b| a * b),
            Builtin::Div => numeric(&args, |a, b| a / b),
            Builtin::Neg => Ok(Value::Number(-args[0].as_number()?)),
            Builtin::Abs => Ok(Value::Number(args[0].as_number()?.abs())),
            Builtin::Min => pick(args, Ordering::Less),
            Builtin::Max => pick(args, Ordering::Greater),
            Builtin::Eq => Ok(Value::Bool(args[0] == args[1])),
            Builtin::Neq => Ok(Value::Bool(args[0] != args[1])),
            Builtin::Lt => ordered(&args, |o| o == Ordering::Less),
            Builtin::Le => ordered(&args, |o| o != Ordering::Greater),
            Builtin::Gt => ordered(&args, |o| o == Ordering::Greater),
            Builtin::Ge => ordered(&args, |o| o != Ordering::Less),
            Builtin::And => Ok(Value::Bool(args[0].as_bool()? && args[1].as_bool()?)),
            Builtin::Or => Ok(Value::Bool(args[0].as_bool()? || args[1].as_bool()?)),
            Builtin::Not => Ok(Value::Bool(!args[0].as_bool()?)),
            Builtin::Mux => {
                let mut args = args;
                let otherwise = args.pop();
                let then = args.pop();
                let pick_then = args[0].as_bool()?;
                Ok(if pick_then { then } else { otherwise }.unwrap_or(Value::Unit))
            }
            Builtin::Tuple => Ok(Value::Tuple(args)),
            Builtin::Get => {
                let items = args[0].as_tuple()?;
                let index = args[1].as_number()?;
                if index < 0.0 || index.fract() != 0.0 || index as usize >= items.len() {
                    return Err(ErrorKind::TypeMismatch { expected: "tuple index", found: args[1].type_name() });
                }
                Ok(items[index as usize].clone())
            }
            Builtin::Concat => Ok(Value::Text(format!("{}{}", args[0].as_text()?, args[1].as_text()?))),
        }
    }
}

fn numeric(args: &[Value], op: impl Fn(f64, f64) -> f64) -> Result<Value, ErrorKind> {
    Ok(Value::Number(op(args[0].as_number()?, args[1].as_number()?)))
}

fn ordered(args: &[Value], test: impl Fn(Ordering) -> bool) -> Result<Value, ErrorKind> {
    Ok(Value::Bool(test(args[0].compare(&args[1])?)))
}

fn pick(mut args: Vec<Value>, keep_left_when: Ordering) -> Result<Value, ErrorKind> {
    let right = args.pop().unwrap_or(Value::Unit);
    let left = args.pop().unwrap_or(Value::Unit);
    // Ties keep the left operand so folds stay stable.
    Ok(match left.compare(&right)? {
        Ordering::Equal => left,
        o if o == keep_left_when => left,
        _ => right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_infinity() {
        let inf = Value::Number(f64::INFINITY);
        assert_eq!(Builtin::Add.call(vec![inf.clone(), 1.into()]).unwrap(), inf);
        assert_eq!(Builtin::Min.call(vec![inf, 3.into()]).unwrap(), Value::Number(3.0));
        assert_eq!(Builtin::Max.call(vec![2.into(), 3.into()]).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn wrong_variant_is_a_type_mismatch() {
        let err = Builtin::Add.call(vec![1.into(), true.into()]).unwrap_err();
        assert_eq!(err, ErrorKind::TypeMismatch { expected: "number", found: "bool" });
        let err = Builtin::Mux.call(vec![1.into(), 2.into(), 3.into()]).unwrap_err();
        assert_eq!(err, ErrorKind::TypeMismatch { expected: "bool", found: "number" });
    }

    #[test]
    fn wrong_argument_count_is_an_arity_mismatch() {
        let err = Builtin::Not.call(vec![true.into(), false.into()]).unwrap_err();
        assert_eq!(err, ErrorKind::ArityMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn mux_and_tuples() {
        let t = Builtin::Tuple.call(vec![1.into(), "a".into()]).unwrap();
        assert_eq!(Builtin::Get.call(vec![t.clone(), 1.into()]).unwrap(), Value::Text("a".into()));
        let out_of_range = Builtin::Get.call(vec![t, 2.into()]).unwrap_err();
        assert_eq!(out_of_range, ErrorKind::TypeMismatch { expected: "tuple index", found: "number" });
        assert_eq!(Builtin::Mux.call(vec![false.into(), 1.into(), 2.into()]).unwrap(), Value::Number(2.0));
    }
}
