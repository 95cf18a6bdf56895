//! Per-round exports and the device-local state derived from them.

use std::{collections::BTreeMap, fmt};
use serde::{Deserialize, Serialize};

use crate::path::{Path, SlotKind};
use crate::value::Value;

/// Opaque, network-unique device identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Every observable value one round produced, keyed by path. The root path
/// holds the program result. Built once by [`ExportBuilder`] and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Export {
    entries: BTreeMap<Path, Value>,
}

impl Export {
    pub fn get(&self, path: &Path) -> Option<&Value> { self.entries.get(path) }

    pub fn contains(&self, path: &Path) -> bool { self.entries.contains_key(path) }

    pub fn root(&self) -> Option<&Value> { self.entries.get(&Path::root()) }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Value)> { self.entries.iter() }

    /// Entries produced by state-carrying constructs.
    pub fn rep_entries(&self) -> impl Iterator<Item = (&Path, &Value)> {
        self.entries.iter().filter(|(path, _)| path.last().map(|s| s.kind()) == Some(SlotKind::Rep))
    }
}

#[derive(Debug, Default)]
pub struct ExportBuilder {
    entries: BTreeMap<Path, Value>,
}

impl ExportBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn put(&mut self, path: Path, value: Value) { self.entries.insert(path, value); }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn finish(mut self, root: Value) -> Export {
        self.entries.insert(Path::root(), root);
        Export { entries: self.entries }
    }
}

/// Values remembered by `rep` constructs across rounds.
///
/// Entries at paths not revisited in a round stay until superseded; only a
/// restart (a fresh `DeviceState`) forgets them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    values: BTreeMap<Path, Value>,
}

impl DeviceState {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, path: &Path) -> Option<&Value> { self.values.get(path) }

    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Archives the rep entries of a finished round; returns how many paths
    /// were written.
    pub fn absorb(&mut self, export: &Export) -> usize {
        let mut written = 0;
        for (path, value) in export.rep_entries() {
            self.values.insert(path.clone(), value.clone());
            written += 1;
        }
        written
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Value)> { self.values.iter() }
}
