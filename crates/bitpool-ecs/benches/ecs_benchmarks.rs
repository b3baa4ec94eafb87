//! Pool and view throughput benchmarks.
//!
//! - pool churn: add/remove cycles on a half-full pool, where every add has
//!   to find the earliest hole.
//! - view iteration: a movement step over a registry where only a fraction
//!   of entities carry the velocity component.
//! - clone_entity on entities with several components.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bitpool_ecs::pool::ComponentPool;
use bitpool_ecs::registry::Registry;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Health(u32);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Registry with `entity_count` entities, all with Position and Health and
/// every `moving_every`-th one with Velocity.
fn setup_registry(entity_count: usize, moving_every: usize) -> Registry {
    let mut registry = Registry::with_max_components(entity_count);
    for i in 0..entity_count {
        let e = registry.create();
        let _ = registry.add_component(e, Position { x: i as f64, y: 0.0 });
        let _ = registry.add_component(e, Health(100));
        if i % moving_every == 0 {
            let _ = registry.add_component(e, Velocity { dx: 1.0, dy: 0.5 });
        }
    }
    registry
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_pool_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_churn");
    for &capacity in &[1_024usize, 16_384] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            let mut pool = ComponentPool::new::<Position>(cap).unwrap();
            for i in 0..cap {
                pool.add(Position { x: i as f64, y: 0.0 }).unwrap();
            }
            // Punch holes in every other slot.
            for slot in (0..cap).step_by(2) {
                pool.remove(slot).unwrap();
            }
            b.iter(|| {
                let slot = pool.add(Position { x: 1.0, y: 1.0 }).unwrap();
                pool.remove(black_box(slot)).unwrap();
                black_box(pool.next_free())
            });
        });
    }
    group.finish();
}

fn bench_view_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_movement");
    for &count in &[1_000usize, 10_000] {
        for &moving_every in &[1usize, 4] {
            let mut registry = setup_registry(count, moving_every);
            let id = format!("{count}/1_in_{moving_every}");
            group.bench_function(BenchmarkId::from_parameter(id), |b| {
                b.iter(|| {
                    registry
                        .view_mut::<(&mut Position, &Velocity)>()
                        .each(|(pos, vel)| {
                            pos.x += vel.dx;
                            pos.y += vel.dy;
                        });
                });
            });
        }
    }
    group.finish();
}

fn bench_read_view(c: &mut Criterion) {
    let registry = setup_registry(10_000, 2);
    c.bench_function("view_read_sum_10k", |b| {
        b.iter(|| {
            let total: u64 = registry
                .view::<(&Health, &Position)>()
                .iter()
                .map(|(hp, _)| hp.0 as u64)
                .sum();
            black_box(total)
        });
    });
}

fn bench_clone_entity(c: &mut Criterion) {
    c.bench_function("clone_and_remove_entity", |b| {
        let mut registry = setup_registry(1_000, 1);
        let template = registry.entities()[0];
        // Leave room for the clone.
        let last = registry.entities()[999];
        registry.remove(last);
        b.iter(|| {
            let copy = registry.clone_entity(black_box(template)).unwrap();
            registry.remove(copy);
        });
    });
}

criterion_group!(
    benches,
    bench_pool_churn,
    bench_view_iteration,
    bench_read_view,
    bench_clone_entity
);
criterion_main!(benches);
