//! Benchmarks for octree construction and MLS field evaluation.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use glam::{IVec3, Vec3};
use splatfield::prelude::*;

fn sphere_cloud(n: usize, sphere_radius: f32, splat_radius: f32) -> Vec<Splat> {
    let golden_ratio = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut splats = Vec::with_capacity(n);
    for i in 0..n {
        let theta = 2.0 * std::f32::consts::PI * (i as f32) / golden_ratio;
        let phi = (1.0 - 2.0 * (i as f32 + 0.5) / n as f32).acos();
        let normal = Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
        splats.push(Splat::new(normal * sphere_radius, normal, splat_radius, 1.0));
    }
    splats
}

fn bench_setup() -> (Vec<Splat>, Grid, EngineConfig) {
    let splats = sphere_cloud(2000, 5.0, 1.0);
    // 33 vertices per axis over [-8, 8]
    let grid = Grid::new(Vec3::splat(-8.0), 0.5, IVec3::ZERO, IVec3::splat(32));
    let config = EngineConfig {
        levels: 4,
        ..EngineConfig::default()
    };
    (splats, grid, config)
}

fn bench_octree_build(c: &mut Criterion) {
    let (splats, grid, config) = bench_setup();
    let mut group = c.benchmark_group("octree");
    group.throughput(Throughput::Elements(splats.len() as u64));
    group.bench_function("build_2k_splats", |b| {
        b.iter(|| SplatOctree::build(black_box(&splats), &grid, &config).unwrap())
    });
    group.finish();
}

fn bench_corner_slice(c: &mut Criterion) {
    let (splats, grid, config) = bench_setup();
    let tree = SplatOctree::build(&splats, &grid, &config).unwrap();
    let buffer = SplatBuffer::from_splats(&splats, &grid).unwrap();
    let evaluator = CornerEvaluator::new(&tree, &buffer, &grid, &config);
    let mut image = SliceImage::padded(33, 33, config.wgs);

    let mut group = c.benchmark_group("corners");
    group.throughput(Throughput::Elements((image.width() * image.height()) as u64));
    group.bench_function("slice_33x33", |b| {
        b.iter(|| evaluator.process_slice(black_box(16), &mut image))
    });
    group.finish();
}

fn bench_boundary_batch(c: &mut Criterion) {
    let (splats, grid, config) = bench_setup();
    let tree = SplatOctree::build(&splats, &grid, &config).unwrap();
    let buffer = SplatBuffer::from_splats(&splats, &grid).unwrap();
    let evaluator = BoundaryEvaluator::new(&tree, &buffer, &grid, &config);

    let queries: Vec<Vec3> = sphere_cloud(1024, 5.0, 1.0)
        .into_iter()
        .map(|s| s.position)
        .collect();

    let mut group = c.benchmark_group("boundary");
    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("batch_1024", |b| {
        b.iter(|| evaluator.process_vertices(black_box(&queries)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_octree_build,
    bench_corner_slice,
    bench_boundary_batch
);
criterion_main!(benches);
