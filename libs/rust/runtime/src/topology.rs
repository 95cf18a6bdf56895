//! Neighbor relation. Devices never decide their own neighborhood; a topology
//! answers it each round.

use std::collections::{BTreeMap, BTreeSet};

use field_core::DeviceId;
use parking_lot::RwLock;

pub trait Topology: Send + Sync {
    /// Current neighbors of `device`, never including itself.
    fn neighbors(&self, device: &DeviceId) -> BTreeSet<DeviceId>;
}

/// Explicit symmetric adjacency, editable at runtime.
#[derive(Debug, Default)]
pub struct StaticTopology {
    adjacency: RwLock<BTreeMap<DeviceId, BTreeSet<DeviceId>>>,
}

impl StaticTopology {
    pub fn new() -> Self { Self::default() }

    /// Devices `d0 .. d{n-1}` linked in a chain.
    pub fn line(n: usize) -> Self {
        let topo = Self::new();
        for i in 1..n { topo.link(&device(i - 1), &device(i)); }
        topo
    }

    /// A `width x height` grid of `d{row*width+col}` with 4-neighborhoods.
    pub fn grid(width: usize, height: usize) -> Self {
        let topo = Self::new();
        for row in 0..height {
            for col in 0..width {
                let i = row * width + col;
                topo.add_device(&device(i));
                if col + 1 < width { topo.link(&device(i), &device(i + 1)); }
                if row + 1 < height { topo.link(&device(i), &device(i + width)); }
            }
        }
        topo
    }

    pub fn add_device(&self, id: &DeviceId) { self.adjacency.write().entry(id.clone()).or_default(); }

    pub fn link(&self, a: &DeviceId, b: &DeviceId) {
        if a == b { return; }
        let mut adj = self.adjacency.write();
        adj.entry(a.clone()).or_default().insert(b.clone());
        adj.entry(b.clone()).or_default().insert(a.clone());
    }

    pub fn unlink(&self, a: &DeviceId, b: &DeviceId) {
        let mut adj = self.adjacency.write();
        if let Some(n) = adj.get_mut(a) { n.remove(b); }
        if let Some(n) = adj.get_mut(b) { n.remove(a); }
    }

    pub fn devices(&self) -> Vec<DeviceId> { self.adjacency.read().keys().cloned().collect() }
}

impl Topology for StaticTopology {
    fn neighbors(&self, device: &DeviceId) -> BTreeSet<DeviceId> {
        self.adjacency.read().get(device).cloned().unwrap_or_default()
    }
}

/// Naming used by the `line` and `grid` constructors.
pub fn device(index: usize) -> DeviceId { DeviceId::new(format!("d{index}")) }
