//! Structural paths locating a value inside one evaluation pass.
//!
//! A path is the list of slots entered from the program root. Each slot
//! carries the construct that opened it, its occurrence index among the slots
//! opened at the same level, and the discriminant taken where one exists.
//! Devices that follow the same branches produce the same paths, which is
//! what lets a device find its neighbors' values for a given expression.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Content-derived identity of a lambda's code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeId(pub String);

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind { Nbr, Rep, FoldHood, Branch, FunCall }

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Slot {
    Nbr(u32),
    Rep(u32),
    FoldHood(u32),
    Branch { index: u32, taken: bool },
    FunCall { index: u32, code: CodeId },
}

impl Slot {
    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Nbr(_) => SlotKind::Nbr,
            Slot::Rep(_) => SlotKind::Rep,
            Slot::FoldHood(_) => SlotKind::FoldHood,
            Slot::Branch { .. } => SlotKind::Branch,
            Slot::FunCall { .. } => SlotKind::FunCall,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Slot::Nbr(i) | Slot::Rep(i) | Slot::FoldHood(i) => *i,
            Slot::Branch { index, .. } | Slot::FunCall { index, .. } => *index,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Nbr(i) => write!(f, "nbr#{i}"),
            Slot::Rep(i) => write!(f, "rep#{i}"),
            Slot::FoldHood(i) => write!(f, "foldhood#{i}"),
            Slot::Branch { index, taken } => write!(f, "branch#{index}[{}]", if *taken { "then" } else { "else" }),
            Slot::FunCall { index, code } => write!(f, "fun#{index}[{code}]"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Slot>);

impl Path {
    pub fn root() -> Self { Self::default() }

    pub fn is_root(&self) -> bool { self.0.is_empty() }

    /// A new path one slot deeper; `self` is left as is.
    pub fn push(&self, slot: Slot) -> Self {
        let mut slots = Vec::with_capacity(self.0.len() + 1);
        slots.extend_from_slice(&self.0);
        slots.push(slot);
        Self(slots)
    }

    pub fn last(&self) -> Option<&Slot> { self.0.last() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn slots(&self) -> &[Slot] { &self.0 }

    pub fn starts_with(&self, prefix: &Path) -> bool { self.0.starts_with(&prefix.0) }
}

impl From<Vec<Slot>> for Path {
    fn from(slots: Vec<Slot>) -> Self { Self(slots) }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() { return write!(f, "/"); }
        for slot in &self.0 { write!(f, "/{slot}")?; }
        Ok(())
    }
}
