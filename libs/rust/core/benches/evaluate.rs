use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use field_core::{evaluate, programs, DeviceId, DeviceState, NeighborSnapshot, RoundInputs, SensorMap};

fn neighborhood(size: usize) -> (DeviceState, NeighborSnapshot) {
    let program = programs::hop_gradient("source");
    let sensors = SensorMap::new().with("source", false);
    let mut neighbors = NeighborSnapshot::new();
    for i in 0..size {
        let id = DeviceId::new(format!("n{i}"));
        let mut state = DeviceState::new();
        for _ in 0..2 {
            let inputs = RoundInputs { device: &id, sensors: &sensors, state: &state, neighbors: &NeighborSnapshot::new() };
            let Ok(eval) = evaluate(&program, &inputs) else { continue };
            state.absorb(&eval.export);
            neighbors.insert(id.clone(), Arc::new(eval.export));
        }
    }
    // One warm-up round so the benchmark exercises the update path.
    let me = DeviceId::new("me");
    let mut own = DeviceState::new();
    let inputs = RoundInputs { device: &me, sensors: &sensors, state: &DeviceState::new(), neighbors: &neighbors };
    if let Ok(eval) = evaluate(&program, &inputs) { own.absorb(&eval.export); }
    (own, neighbors)
}

fn bench_gradient(c: &mut Criterion) {
    let program = programs::hop_gradient("source");
    let sensors = SensorMap::new().with("source", false);
    let me = DeviceId::new("me");
    for size in [4usize, 32] {
        let (state, neighbors) = neighborhood(size);
        c.bench_function(&format!("hop_gradient_{size}_neighbors"), |b| {
            b.iter(|| {
                let inputs = RoundInputs { device: &me, sensors: &sensors, state: &state, neighbors: &neighbors };
                black_box(evaluate(black_box(&program), &inputs))
            })
        });
    }
}

criterion_group!(benches, bench_gradient);
criterion_main!(benches);
