//! Store and join throughput.
//!
//! - **insert**: attaching components to entities in shuffled id order, which
//!   exercises the sorted-insert path rather than the append fast case.
//! - **join**: leapfrog intersection of two and three stores with partial
//!   overlap.
//! - **destroy**: dropping handles that own several components each.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use stria_ecs::prelude::*;

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

/// Every entity gets a Position, every second a Velocity, every third a
/// Health.
fn populated_world(entity_count: usize) -> (World, Vec<Entity>) {
    let world = World::new();
    let handles: Vec<Entity> = (0..entity_count).map(|_| world.create()).collect();
    for (i, h) in handles.iter().enumerate() {
        world.insert_component(h.id(), Position { x: i as f64, y: 0.0 });
        if i % 2 == 0 {
            world.insert_component(h.id(), Velocity { dx: 1.0, dy: 0.5 });
        }
        if i % 3 == 0 {
            world.insert_component(h.id(), Health(100));
        }
    }
    (world, handles)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_shuffled_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_shuffled");
    for &n in &[1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let world = World::new();
                let mut handles: Vec<Entity> = (0..n).map(|_| world.create()).collect();
                handles.shuffle(&mut Pcg64::seed_from_u64(7));
                for h in &handles {
                    world.insert_component(h.id(), Health(1));
                }
                black_box(world.component_count::<Health>());
                drop(handles);
            });
        });
    }
    group.finish();
}

fn bench_two_way_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_position_velocity");
    for &n in &[1_000usize, 10_000] {
        let (world, handles) = populated_world(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                world.query::<(Position, Velocity)>().for_each(|_, (pos, vel)| {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                });
            });
        });
        drop(handles);
    }
    group.finish();
}

fn bench_three_way_join(c: &mut Criterion) {
    let (world, handles) = populated_world(10_000);
    c.bench_function("join_three_way_10k", |b| {
        b.iter(|| black_box(world.query::<(Position, Velocity, Health)>().entities().len()));
    });
    drop(handles);
}

fn bench_destroy(c: &mut Criterion) {
    c.bench_function("destroy_1k", |b| {
        b.iter_batched(
            || populated_world(1_000),
            |(world, handles)| {
                drop(handles);
                black_box(world.ledger_len());
            },
            BatchSize::LargeInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_shuffled_insert,
    bench_two_way_join,
    bench_three_way_join,
    bench_destroy,
);
criterion_main!(benches);
